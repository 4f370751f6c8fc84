//! The `confsync init` command.
//!
//! Scaffolds a project in the current directory: writes a default
//! `confsync.yaml`, creates both storage directories and the state
//! directory, and records the init event.

use crate::context::{SETTINGS_FILE, SyncContext};
use crate::error::{Result, SyncError};
use crate::events::{Event, EventAction, append_event};
use crate::fs::atomic_write_file;
use crate::settings::Settings;
use serde_json::json;
use std::env;
use std::fs;

pub fn cmd_init() -> Result<()> {
    let cwd = env::current_dir().map_err(|e| {
        SyncError::UserError(format!("failed to get current working directory: {}", e))
    })?;

    init_at(&cwd)
}

/// Initialize a project rooted at the given directory.
pub(crate) fn init_at(root: &std::path::Path) -> Result<()> {
    let settings_path = root.join(SETTINGS_FILE);
    if settings_path.exists() {
        return Err(SyncError::UserError(format!(
            "'{}' already exists; this directory is already a confsync project",
            settings_path.display()
        )));
    }

    let settings = Settings::default();
    atomic_write_file(&settings_path, &settings.to_yaml()?)?;

    let ctx = SyncContext::from_parts(root.to_path_buf(), settings);
    for dir in [&ctx.active_dir, &ctx.sync_dir, &ctx.state_dir, &ctx.locks_dir()] {
        fs::create_dir_all(dir).map_err(|e| {
            SyncError::UserError(format!("failed to create '{}': {}", dir.display(), e))
        })?;
    }

    append_event(
        &ctx,
        &Event::new(EventAction::Init).with_details(json!({
            "active_dir": ctx.settings.active_dir,
            "sync_dir": ctx.settings.sync_dir,
        })),
    )?;

    println!("Initialized confsync project in '{}'.", root.display());
    println!("  Active storage: {}", ctx.settings.active_dir);
    println!("  Sync storage:   {}", ctx.settings.sync_dir);
    println!("  State:          {}", ctx.settings.state_dir);

    Ok(())
}
