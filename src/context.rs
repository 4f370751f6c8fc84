//! Project context resolution for confsync.
//!
//! This module finds the project root (the nearest ancestor directory
//! containing `confsync.yaml`) and resolves the absolute paths for the
//! active storage, sync storage, and state directories.
//!
//! All commands resolve their paths through this module so operations
//! always target the same project regardless of where the command is
//! invoked from.

use crate::error::{Result, SyncError};
use crate::settings::Settings;
use std::env;
use std::path::{Path, PathBuf};

/// Name of the settings file that marks a project root.
pub const SETTINGS_FILE: &str = "confsync.yaml";

/// Resolved paths and settings for a confsync project.
///
/// All paths are absolute.
#[derive(Debug, Clone)]
pub struct SyncContext {
    /// Project root (directory containing `confsync.yaml`).
    pub root: PathBuf,

    /// Parsed project settings.
    pub settings: Settings,

    /// Active configuration storage directory.
    pub active_dir: PathBuf,

    /// Staged/sync configuration storage directory.
    pub sync_dir: PathBuf,

    /// State directory (locks, events, snapshot).
    pub state_dir: PathBuf,
}

impl SyncContext {
    /// Resolve the project context from the current working directory.
    pub fn resolve() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            SyncError::UserError(format!("failed to get current working directory: {}", e))
        })?;

        Self::resolve_from(&cwd)
    }

    /// Resolve the project context from a specific directory.
    ///
    /// Walks up from `start` to the nearest directory containing
    /// `confsync.yaml` and loads the settings found there.
    pub fn resolve_from<P: AsRef<Path>>(start: P) -> Result<Self> {
        let root = find_project_root(start.as_ref())?;
        let settings = Settings::load(root.join(SETTINGS_FILE))?;
        Ok(Self::from_parts(root, settings))
    }

    /// Build a context from an already-known root and settings.
    pub fn from_parts(root: PathBuf, settings: Settings) -> Self {
        let active_dir = root.join(&settings.active_dir);
        let sync_dir = root.join(&settings.sync_dir);
        let state_dir = root.join(&settings.state_dir);

        Self {
            root,
            settings,
            active_dir,
            sync_dir,
            state_dir,
        }
    }

    /// Path to the settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    /// Directory holding advisory lock files.
    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }

    /// Path to the append-only event log.
    pub fn events_path(&self) -> PathBuf {
        self.state_dir.join("events.ndjson")
    }

    /// Path to the persisted import snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("import-snapshot.json")
    }
}

/// Walk up from `start` looking for a directory containing `confsync.yaml`.
fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut current = if start.is_absolute() {
        start.to_path_buf()
    } else {
        env::current_dir()
            .map_err(|e| SyncError::UserError(format!("failed to resolve '{}': {}", start.display(), e)))?
            .join(start)
    };

    loop {
        if current.join(SETTINGS_FILE).is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(SyncError::UserError(format!(
                "not a confsync project (no {} found in '{}' or any parent); run 'confsync init' first",
                SETTINGS_FILE,
                start.display()
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_from_project_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(SETTINGS_FILE), "").unwrap();

        let ctx = SyncContext::resolve_from(temp_dir.path()).unwrap();
        // Canonicalize both sides; macOS tempdirs live behind a symlink.
        assert_eq!(
            ctx.root.canonicalize().unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
        assert!(ctx.active_dir.ends_with("config/active"));
        assert!(ctx.sync_dir.ends_with("config/sync"));
    }

    #[test]
    fn test_resolve_from_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(SETTINGS_FILE), "").unwrap();
        let nested = temp_dir.path().join("config").join("sync");
        fs::create_dir_all(&nested).unwrap();

        let ctx = SyncContext::resolve_from(&nested).unwrap();
        assert_eq!(
            ctx.root.canonicalize().unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_resolve_outside_project_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = SyncContext::resolve_from(temp_dir.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not a confsync project"));
    }

    #[test]
    fn test_custom_directories_from_settings() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(SETTINGS_FILE),
            "active_dir: live\nsync_dir: staged\nstate_dir: .state\n",
        )
        .unwrap();

        let ctx = SyncContext::resolve_from(temp_dir.path()).unwrap();
        assert!(ctx.active_dir.ends_with("live"));
        assert!(ctx.sync_dir.ends_with("staged"));
        assert!(ctx.state_dir.ends_with(".state"));
        assert!(ctx.locks_dir().ends_with(".state/locks"));
        assert!(ctx.events_path().ends_with(".state/events.ndjson"));
        assert!(ctx.snapshot_path().ends_with(".state/import-snapshot.json"));
    }

    #[test]
    fn test_invalid_settings_surface_on_resolve() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(SETTINGS_FILE), "lock_stale_minutes: 0\n").unwrap();

        let result = SyncContext::resolve_from(temp_dir.path());
        assert!(result.is_err());
    }
}
