//! Atomic file writes for confsync.
//!
//! Active configuration, import snapshots, and the settings file are all
//! replaced via temp-file + fsync + rename so a crash mid-write never
//! leaves a half-written config object behind.
//!
//! The temp file is created in the same directory as the target (rename is
//! only atomic within one filesystem) and named `.{filename}.tmp`; on crash
//! a stale temp file may remain.

use crate::error::{Result, SyncError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file, creating parent directories as needed.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            SyncError::StorageWrite(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = temp_path_for(path)?;
    write_and_sync(&temp_path, content)?;
    replace_file(&temp_path, path)?;

    Ok(())
}

/// Atomically write a string to a file.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Temp file path in the same directory as the target.
fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SyncError::StorageWrite(format!("invalid path '{}'", target.display())))?;

    Ok(parent.join(format!(".{}.tmp", filename)))
}

/// Write content to a file and fsync it.
fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        SyncError::StorageWrite(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        SyncError::StorageWrite(format!("failed to write temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        SyncError::StorageWrite(format!("failed to sync temporary file: {}", e))
    })?;

    Ok(())
}

/// Replace the target file with the source file.
#[cfg(unix)]
fn replace_file(source: &Path, target: &Path) -> Result<()> {
    // rename() is atomic on POSIX and replaces an existing destination.
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        SyncError::StorageWrite(format!("failed to replace '{}': {}", target.display(), e))
    })?;

    // Sync the directory entry as well so the rename is durable.
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(windows)]
fn replace_file(source: &Path, target: &Path) -> Result<()> {
    // std::fs::rename fails on Windows when the target exists; remove it
    // first. This loses atomicity on that platform but keeps behavior
    // correct for the single-writer model enforced by the sync lock.
    if target.exists() {
        fs::remove_file(target).map_err(|e| {
            let _ = fs::remove_file(source);
            SyncError::StorageWrite(format!("failed to remove '{}': {}", target.display(), e))
        })?;
    }

    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        SyncError::StorageWrite(format!("failed to replace '{}': {}", target.display(), e))
    })
}
