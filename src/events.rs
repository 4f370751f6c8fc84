//! Event logging for confsync.
//!
//! Append-only audit log in NDJSON format (one JSON object per line) at
//! `{state_dir}/events.ndjson`. Every import mutation is recorded so a
//! partially applied import can be reconstructed after the fact.
//!
//! Events should be appended while holding the sync lock for commands that
//! mutate the active storage, so the log and storage move together.

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Project initialized.
    Init,
    /// Changelist computed.
    Diff,
    /// Validation phase ran.
    Validate,
    /// Import started applying entries.
    ImportStart,
    /// One changelist entry applied.
    EntryApplied,
    /// Import finished with every entry applied.
    ImportCompleted,
    /// Import aborted by validation errors.
    ImportAborted,
    /// Import interrupted by a storage failure.
    ImportFailed,
    /// Sync lock cleared manually.
    LockClear,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            EventAction::Init => "init",
            EventAction::Diff => "diff",
            EventAction::Validate => "validate",
            EventAction::ImportStart => "import_start",
            EventAction::EntryApplied => "entry_applied",
            EventAction::ImportCompleted => "import_completed",
            EventAction::ImportAborted => "import_aborted",
            EventAction::ImportFailed => "import_failed",
            EventAction::LockClear => "lock_clear",
        };
        write!(f, "{}", text)
    }
}

/// An event record for the audit log.
///
/// Serialized as a single-line JSON object and appended to events.ndjson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// The actor who performed the action (e.g. `user@HOST`).
    pub actor: String,

    /// Collection the event applies to, for entry-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Config object name, for entry-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Freeform action-specific details.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl Event {
    /// Create a new event with the current timestamp and actor.
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: actor_string(),
            collection: None,
            name: None,
            details: Value::Null,
        }
    }

    /// Attach a collection and config object name.
    pub fn with_target(mut self, collection: &str, name: &str) -> Self {
        self.collection = Some(collection.to_string());
        self.name = Some(name.to_string());
        self
    }

    /// Attach freeform details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// The actor string: `user@host`.
pub fn actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}@{}", user, host)
}

/// Append an event to the log, creating the file on first use.
pub fn append_event(ctx: &SyncContext, event: &Event) -> Result<()> {
    let path = ctx.events_path();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            SyncError::StorageWrite(format!(
                "failed to create events directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let line = serde_json::to_string(event)
        .map_err(|e| SyncError::StorageWrite(format!("failed to serialize event: {}", e)))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| {
            SyncError::StorageWrite(format!(
                "failed to open event log '{}': {}",
                path.display(),
                e
            ))
        })?;

    writeln!(file, "{}", line)
        .map_err(|e| SyncError::StorageWrite(format!("failed to append event: {}", e)))?;

    Ok(())
}

/// Read all events from the log, oldest first.
///
/// Unparseable lines are skipped rather than failing the whole read; the
/// log is an audit aid, not a source of truth.
pub fn read_events(ctx: &SyncContext) -> Result<Vec<Event>> {
    let path = ctx.events_path();
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        SyncError::StorageRead(format!(
            "failed to read event log '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
