//! Advisory locking for confsync.
//!
//! At most one import may be in flight against the active storage; the
//! sync lock (`{state_dir}/locks/sync.lock`) serializes them. The lock
//! file is created with **create_new** semantics (exclusive create) so
//! only one process can acquire it, and it carries JSON metadata naming
//! the holder.
//!
//! Locks are managed through an RAII guard that releases on drop. A lock
//! older than `lock_stale_minutes` is considered stale (likely left by a
//! crashed process) and may be cleared manually or taken over with
//! `--force`.

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::events::actor_string;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// File name of the sync lock.
const SYNC_LOCK_FILE: &str = "sync.lock";

/// Metadata stored inside a lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMetadata {
    /// Owner of the lock (e.g. `user@HOST`).
    pub owner: String,

    /// Process ID of the lock holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the lock was created (RFC3339).
    pub created_at: DateTime<Utc>,

    /// The action being performed (diff/import/...).
    pub action: String,
}

impl LockMetadata {
    /// New metadata for the current process and timestamp.
    pub fn new(action: &str) -> Self {
        Self {
            owner: actor_string(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
            action: action.to_string(),
        }
    }

    /// Age of the lock.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Human-readable age.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else {
            format!("{}m", minutes)
        }
    }

    /// Whether the lock is older than the staleness threshold.
    pub fn is_stale(&self, stale_minutes: u32) -> bool {
        self.age().num_minutes() > stale_minutes as i64
    }
}

/// RAII guard for the sync lock; releases the lock on drop.
#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
    released: bool,
}

impl SyncLock {
    /// Acquire the sync lock for the given action.
    ///
    /// Fails with `SyncError::Lock` when another process holds it; the
    /// message names the holder and the lock's age, and says whether the
    /// lock looks stale.
    pub fn acquire(ctx: &SyncContext, action: &str) -> Result<Self> {
        Self::acquire_inner(ctx, action, false)
    }

    /// Acquire the lock, taking over a stale one.
    ///
    /// A fresh lock still refuses; only locks past the staleness threshold
    /// are replaced.
    pub fn acquire_force_stale(ctx: &SyncContext, action: &str) -> Result<Self> {
        Self::acquire_inner(ctx, action, true)
    }

    fn acquire_inner(ctx: &SyncContext, action: &str, take_stale: bool) -> Result<Self> {
        let locks_dir = ctx.locks_dir();
        fs::create_dir_all(&locks_dir).map_err(|e| {
            SyncError::Lock(format!(
                "failed to create locks directory '{}': {}",
                locks_dir.display(),
                e
            ))
        })?;

        let path = locks_dir.join(SYNC_LOCK_FILE);
        let metadata = LockMetadata::new(action);

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let json = serde_json::to_string_pretty(&metadata).map_err(|e| {
                        SyncError::Lock(format!("failed to serialize lock metadata: {}", e))
                    })?;
                    file.write_all(json.as_bytes()).map_err(|e| {
                        let _ = fs::remove_file(&path);
                        SyncError::Lock(format!("failed to write lock metadata: {}", e))
                    })?;
                    return Ok(Self {
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let holder = read_lock(ctx)?;
                    let stale = holder
                        .as_ref()
                        .is_some_and(|m| m.is_stale(ctx.settings.lock_stale_minutes));

                    if take_stale && (stale || holder.is_none()) {
                        // Stale (or unreadable-and-gone) lock: remove and retry.
                        let _ = fs::remove_file(&path);
                        continue;
                    }

                    let detail = match holder {
                        Some(m) => format!(
                            "held by {} for {} (action: {}){}",
                            m.owner,
                            m.age_string(),
                            m.action,
                            if stale { ", looks stale" } else { "" }
                        ),
                        None => "lock file exists but its metadata is unreadable".to_string(),
                    };
                    return Err(SyncError::Lock(format!(
                        "another import is in progress: {}. Use 'confsync lock clear' if it is stale.",
                        detail
                    )));
                }
                Err(e) => {
                    return Err(SyncError::Lock(format!(
                        "failed to create lock file '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
    }

    /// Release the lock explicitly.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|e| {
            SyncError::Lock(format!(
                "failed to remove lock file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = fs::remove_file(&self.path) {
                eprintln!(
                    "Warning: failed to release lock '{}': {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Read the current lock metadata, if a lock is held.
pub fn read_lock(ctx: &SyncContext) -> Result<Option<LockMetadata>> {
    let path = ctx.locks_dir().join(SYNC_LOCK_FILE);
    if !path.is_file() {
        return Ok(None);
    }

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        // Racing release: the file vanished between the check and the read.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SyncError::Lock(format!(
                "failed to read lock file '{}': {}",
                path.display(),
                e
            )));
        }
    };

    Ok(serde_json::from_str(&content).ok())
}

/// Remove the sync lock unconditionally. Returns whether a lock existed.
pub fn clear_lock(ctx: &SyncContext) -> Result<bool> {
    let path = ctx.locks_dir().join(SYNC_LOCK_FILE);
    if !path.is_file() {
        return Ok(false);
    }

    fs::remove_file(&path).map_err(|e| {
        SyncError::Lock(format!(
            "failed to remove lock file '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> SyncContext {
        SyncContext::from_parts(dir.path().to_path_buf(), Settings::default())
    }

    #[test]
    fn test_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        let lock = SyncLock::acquire(&ctx, "import").unwrap();
        assert!(read_lock(&ctx).unwrap().is_some());

        lock.release().unwrap();
        assert!(read_lock(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_second_acquire_fails() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        let _lock = SyncLock::acquire(&ctx, "import").unwrap();
        let err = SyncLock::acquire(&ctx, "import").unwrap_err();

        assert!(matches!(err, SyncError::Lock(_)));
        assert!(err.to_string().contains("another import is in progress"));
    }

    #[test]
    fn test_drop_releases_lock() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        {
            let _lock = SyncLock::acquire(&ctx, "diff").unwrap();
            assert!(read_lock(&ctx).unwrap().is_some());
        }
        assert!(read_lock(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_metadata_contents() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        let _lock = SyncLock::acquire(&ctx, "import").unwrap();
        let metadata = read_lock(&ctx).unwrap().unwrap();

        assert_eq!(metadata.action, "import");
        assert!(metadata.owner.contains('@'));
        assert_eq!(metadata.pid, Some(std::process::id()));
        assert!(!metadata.is_stale(120));
    }

    #[test]
    fn test_force_refuses_fresh_lock() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        let _lock = SyncLock::acquire(&ctx, "import").unwrap();
        assert!(SyncLock::acquire_force_stale(&ctx, "import").is_err());
    }

    #[test]
    fn test_force_takes_over_stale_lock() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        // Plant a lock that is far past the staleness threshold.
        fs::create_dir_all(ctx.locks_dir()).unwrap();
        let old = LockMetadata {
            owner: "ghost@elsewhere".to_string(),
            pid: None,
            created_at: Utc::now() - Duration::minutes(600),
            action: "import".to_string(),
        };
        fs::write(
            ctx.locks_dir().join(SYNC_LOCK_FILE),
            serde_json::to_string(&old).unwrap(),
        )
        .unwrap();

        let lock = SyncLock::acquire_force_stale(&ctx, "import").unwrap();
        let metadata = read_lock(&ctx).unwrap().unwrap();
        assert_ne!(metadata.owner, "ghost@elsewhere");
        lock.release().unwrap();
    }

    #[test]
    fn test_clear_lock() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir);

        assert!(!clear_lock(&ctx).unwrap());

        let lock = SyncLock::acquire(&ctx, "import").unwrap();
        assert!(clear_lock(&ctx).unwrap());
        // The guard would warn on drop since the file is gone; mark released.
        let _ = lock.release();
    }

    #[test]
    fn test_stale_detection() {
        let metadata = LockMetadata {
            owner: "a@b".to_string(),
            pid: None,
            created_at: Utc::now() - Duration::minutes(200),
            action: "import".to_string(),
        };
        assert!(metadata.is_stale(120));
        assert!(!metadata.is_stale(300));
    }

    #[test]
    fn test_age_string() {
        let metadata = LockMetadata {
            owner: "a@b".to_string(),
            pid: None,
            created_at: Utc::now() - Duration::minutes(90),
            action: "import".to_string(),
        };
        assert_eq!(metadata.age_string(), "1h 30m");
    }
}
