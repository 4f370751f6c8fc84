//! Command implementations for confsync.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the small lock-management handlers.

mod diff;
mod import;
mod init;
mod status;

use crate::cli::{Command, LockAction, LockCommand};
use crate::context::SyncContext;
use crate::entity::EntityTypeRegistry;
use crate::error::Result;
use crate::events::{Event, EventAction, append_event};
use crate::locks;
use crate::schema::RequiredKeyValidator;
use crate::storage::FileStorage;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Init => init::cmd_init(),
        Command::Status => status::cmd_status(),
        Command::Diff(args) => diff::cmd_diff(args),
        Command::Validate => import::cmd_validate(),
        Command::Import(args) => import::cmd_import(args),
        Command::Export(args) => diff::cmd_export(args),
        Command::Lock(lock_cmd) => dispatch_lock(lock_cmd),
    }
}

/// Dispatch lock subcommands.
fn dispatch_lock(lock_cmd: LockCommand) -> Result<()> {
    match lock_cmd.action {
        LockAction::List => cmd_lock_list(),
        LockAction::Clear => cmd_lock_clear(),
    }
}

fn cmd_lock_list() -> Result<()> {
    let ctx = SyncContext::resolve()?;

    match locks::read_lock(&ctx)? {
        None => println!("No sync lock held."),
        Some(metadata) => {
            println!("Sync lock:");
            println!("  Owner:      {}", metadata.owner);
            if let Some(pid) = metadata.pid {
                println!("  PID:        {}", pid);
            }
            println!("  Action:     {}", metadata.action);
            println!("  Age:        {}", metadata.age_string());
            if metadata.is_stale(ctx.settings.lock_stale_minutes) {
                println!("  Stale:      yes (threshold {}m)", ctx.settings.lock_stale_minutes);
            }
        }
    }

    Ok(())
}

fn cmd_lock_clear() -> Result<()> {
    let ctx = SyncContext::resolve()?;

    if locks::clear_lock(&ctx)? {
        append_event(&ctx, &Event::new(EventAction::LockClear))?;
        println!("Sync lock cleared.");
    } else {
        println!("No sync lock to clear.");
    }

    Ok(())
}

/// Open the active and sync file storages for a project.
pub(crate) fn open_storages(ctx: &SyncContext) -> (FileStorage, FileStorage) {
    (
        FileStorage::new(&ctx.active_dir),
        FileStorage::new(&ctx.sync_dir),
    )
}

/// Build the schema validator from the project's entity type definitions.
pub(crate) fn build_validator(ctx: &SyncContext) -> RequiredKeyValidator {
    RequiredKeyValidator::new(EntityTypeRegistry::new(ctx.settings.entity_types.clone()))
}

#[cfg(test)]
pub(crate) use init::init_at as init_project_at;
