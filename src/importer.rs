//! Staged configuration import.
//!
//! The importer consumes one changelist and drives it through a small
//! state machine:
//!
//! ```text
//! Validating -> Applying -> Completed
//!      |            |
//!      v            v
//!   Aborted   PartiallyApplied
//! ```
//!
//! `validate()` checks every entry (collect-all-errors semantics) before a
//! single write happens; any error aborts the import. `apply()` executes
//! entries strictly in changelist order behind a cursor, optionally in
//! batches, and persists a snapshot so a batched import can resume across
//! process invocations. A storage failure stops the pass immediately and
//! leaves the exact applied/remaining partition observable; entries
//! already applied stay applied (each entry atomic, the batch non-atomic).

use crate::comparer::{ChangeOp, Changelist, ChangelistEntry, ChangelistExportEntry};
use crate::error::{Result, SyncError};
use crate::fs::atomic_write_file;
use crate::graph::DependencyManager;
use crate::object::{ConfigObject, DEFAULT_COLLECTION};
use crate::schema::SchemaValidator;
use crate::storage::{ConfigStorage, read_collection};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Importer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    /// Changelist accepted, validation not yet finished.
    Validating,
    /// Validation passed; entries are being applied.
    Applying,
    /// Every entry applied.
    Completed,
    /// Validation found errors; no write was performed.
    Aborted,
    /// A storage failure interrupted the apply pass.
    PartiallyApplied,
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ImportState::Validating => "validating",
            ImportState::Applying => "applying",
            ImportState::Completed => "completed",
            ImportState::Aborted => "aborted",
            ImportState::PartiallyApplied => "partially applied",
        };
        write!(f, "{}", text)
    }
}

/// Per-entry outcome of the validation phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportValidationResult {
    /// Entry is valid and will be applied.
    Success,
    /// Entry is already satisfied (e.g. resumed from a stale snapshot);
    /// apply advances over it without a write.
    Skipped,
    /// Entry is invalid; the reason names the offending objects.
    Error { reason: String },
}

/// Progress report for one `apply()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyProgress {
    /// Entries written during this call.
    pub applied: usize,
    /// Entries advanced over without a write during this call.
    pub skipped: usize,
    /// Entries still pending after this call.
    pub remaining: usize,
    /// Whether the whole changelist has been processed.
    pub complete: bool,
}

/// Serialized importer state for resumable batched imports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSnapshot {
    pub state: ImportState,
    pub cursor: usize,
    pub entries: Vec<ChangelistExportEntry>,
    #[serde(default)]
    pub results: Vec<ImportValidationResult>,
}

impl ImportSnapshot {
    /// Persist the snapshot as JSON via an atomic write.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            SyncError::StorageWrite(format!("failed to serialize import snapshot: {}", e))
        })?;
        atomic_write_file(path, &json)
    }

    /// Load a snapshot previously written by `save`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::StorageRead(format!(
                "failed to read import snapshot '{}': {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SyncError::StorageRead(format!(
                "failed to parse import snapshot '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

/// Applies one changelist against the active storage.
pub struct ConfigImporter {
    changelist: Changelist,
    state: ImportState,
    cursor: usize,
    results: Vec<ImportValidationResult>,
}

impl ConfigImporter {
    /// Start a new import for the given changelist.
    pub fn new(changelist: Changelist) -> Self {
        Self {
            changelist,
            state: ImportState::Validating,
            cursor: 0,
            results: Vec::new(),
        }
    }

    /// Rebuild an importer from a persisted snapshot.
    pub fn from_snapshot(snapshot: ImportSnapshot) -> Result<Self> {
        let changelist = Changelist::from_export(snapshot.entries)?;
        if snapshot.cursor > changelist.len() {
            return Err(SyncError::UserError(format!(
                "import snapshot cursor {} is beyond the changelist ({} entries)",
                snapshot.cursor,
                changelist.len()
            )));
        }
        Ok(Self {
            changelist,
            state: snapshot.state,
            cursor: snapshot.cursor,
            results: snapshot.results,
        })
    }

    /// Snapshot the remaining work for persistence between batch steps.
    pub fn snapshot(&self) -> ImportSnapshot {
        ImportSnapshot {
            state: self.state,
            cursor: self.cursor,
            entries: self.changelist.to_export(),
            results: self.results.clone(),
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn changelist(&self) -> &Changelist {
        &self.changelist
    }

    /// Per-entry validation results, aligned with the changelist.
    pub fn validation_results(&self) -> &[ImportValidationResult] {
        &self.results
    }

    /// All validation error messages, in changelist order.
    pub fn validation_errors(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|result| match result {
                ImportValidationResult::Error { reason } => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    /// Entries already processed by `apply()`.
    pub fn applied_entries(&self) -> &[ChangelistEntry] {
        &self.changelist.entries()[..self.cursor]
    }

    /// Entries not yet processed.
    pub fn remaining_entries(&self) -> &[ChangelistEntry] {
        &self.changelist.entries()[self.cursor..]
    }

    /// Validate every entry against the current storages.
    ///
    /// Checks, per entry: dependency completeness of the target data,
    /// deletion safety (no dependent left behind outside the changelist),
    /// and the schema validator collaborator. All entries are checked even
    /// after a failure; any error transitions the import to `Aborted` and
    /// `apply()` will refuse to run.
    pub fn validate(
        &mut self,
        active: &dyn ConfigStorage,
        sync: &dyn ConfigStorage,
        validator: &dyn SchemaValidator,
    ) -> Result<&[ImportValidationResult]> {
        if self.state != ImportState::Validating {
            return Err(SyncError::UserError(format!(
                "validate() called on an import that is already {}",
                self.state
            )));
        }

        // Dependency semantics live in the default collection; override
        // collections hold partial override data without dependency meaning.
        let active_objects = read_collection(active, DEFAULT_COLLECTION)?;
        let active_manager = DependencyManager::build(&active_objects)?;

        // Names the default collection will contain at each point of the
        // ordered changelist, updated as entries validate.
        let mut will_exist: HashSet<String> =
            active_objects.iter().map(|o| o.name().to_string()).collect();

        // Every default-collection name touched by the changelist; a
        // dependent being updated or deleted in the same pass is not
        // "left behind".
        let mut scheduled: HashSet<&str> = HashSet::new();
        for entry in self.changelist.entries() {
            if entry.collection == DEFAULT_COLLECTION {
                scheduled.insert(entry.name.as_str());
                if let ChangeOp::Rename { old_name } = &entry.op {
                    scheduled.insert(old_name.as_str());
                }
            }
        }

        let mut results = Vec::with_capacity(self.changelist.len());
        // Cache of active hashes for skip detection.
        let mut active_cache: HashMap<(String, String), Option<ConfigObject>> = HashMap::new();

        for entry in self.changelist.entries() {
            let result = self.validate_entry(
                entry,
                active,
                sync,
                validator,
                &active_manager,
                &mut will_exist,
                &scheduled,
                &mut active_cache,
            )?;
            results.push(result);
        }

        let has_errors = results
            .iter()
            .any(|r| matches!(r, ImportValidationResult::Error { .. }));

        self.results = results;
        self.state = if has_errors {
            ImportState::Aborted
        } else {
            ImportState::Applying
        };

        Ok(&self.results)
    }

    #[allow(clippy::too_many_arguments)]
    fn validate_entry(
        &self,
        entry: &ChangelistEntry,
        active: &dyn ConfigStorage,
        sync: &dyn ConfigStorage,
        validator: &dyn SchemaValidator,
        active_manager: &DependencyManager,
        will_exist: &mut HashSet<String>,
        scheduled: &HashSet<&str>,
        active_cache: &mut HashMap<(String, String), Option<ConfigObject>>,
    ) -> Result<ImportValidationResult> {
        let in_default = entry.collection == DEFAULT_COLLECTION;
        let mut reasons = Vec::new();

        let cache_key = (entry.collection.clone(), entry.name.clone());
        let active_obj = match active_cache.get(&cache_key) {
            Some(cached) => cached.clone(),
            None => {
                let read = active.read(&entry.collection, &entry.name)?;
                active_cache.insert(cache_key, read.clone());
                read
            }
        };

        match &entry.op {
            ChangeOp::Delete => {
                if active_obj.is_none() {
                    return Ok(ImportValidationResult::Skipped);
                }
                if in_default {
                    for dependent in active_manager.dependents_of(&entry.name) {
                        if !scheduled.contains(dependent.as_str()) {
                            reasons.push(format!(
                                "cannot delete '{}': '{}' depends on it and is not part of this import",
                                entry.name, dependent
                            ));
                        }
                    }
                    if reasons.is_empty() {
                        will_exist.remove(&entry.name);
                    }
                }
            }
            ChangeOp::Create | ChangeOp::Update | ChangeOp::Rename { .. } => {
                let Some(sync_obj) = sync.read(&entry.collection, &entry.name)? else {
                    return Ok(ImportValidationResult::Error {
                        reason: format!(
                            "'{}' is scheduled for {} but missing from the sync storage",
                            entry.name,
                            entry.op.keyword()
                        ),
                    });
                };

                // Already satisfied: a create whose target exists with
                // identical content (stale snapshot resume).
                if matches!(entry.op, ChangeOp::Create)
                    && let Some(existing) = &active_obj
                    && existing.canonical_hash() == sync_obj.canonical_hash()
                {
                    return Ok(ImportValidationResult::Skipped);
                }

                if let ChangeOp::Rename { old_name } = &entry.op {
                    let old_exists = active.exists(&entry.collection, old_name)?;
                    if !old_exists {
                        if active_obj.is_some() {
                            // Old name already gone and new name present:
                            // the rename happened in a previous pass.
                            return Ok(ImportValidationResult::Skipped);
                        }
                        reasons.push(format!(
                            "cannot rename '{}' to '{}': the source no longer exists",
                            old_name, entry.name
                        ));
                    }
                }

                if in_default {
                    for dep in sync_obj.dependencies().effective_config() {
                        if !will_exist.contains(&dep) {
                            reasons.push(format!(
                                "'{}' depends on '{}' which is neither active nor created earlier in this import",
                                entry.name, dep
                            ));
                        }
                    }
                }

                for message in validator.validate(&entry.name, sync_obj.data()) {
                    reasons.push(format!("schema validation failed for {}", message));
                }

                if reasons.is_empty() && in_default {
                    if let ChangeOp::Rename { old_name } = &entry.op {
                        will_exist.remove(old_name);
                    }
                    will_exist.insert(entry.name.clone());
                }
            }
        }

        if reasons.is_empty() {
            Ok(ImportValidationResult::Success)
        } else {
            Ok(ImportValidationResult::Error {
                reason: reasons.join("; "),
            })
        }
    }

    /// Apply pending entries in changelist order.
    ///
    /// With `limit = Some(n)` at most n entries are written before
    /// returning (the import stays `Applying`); with `None` the whole
    /// remainder is processed. A storage failure transitions to
    /// `PartiallyApplied` and returns the error; the cursor stays on the
    /// failing entry so a later call (or a resumed snapshot) retries it.
    pub fn apply(
        &mut self,
        active: &mut dyn ConfigStorage,
        sync: &dyn ConfigStorage,
        limit: Option<usize>,
    ) -> Result<ApplyProgress> {
        match self.state {
            ImportState::Applying | ImportState::PartiallyApplied => {}
            ImportState::Completed => {
                return Ok(ApplyProgress {
                    applied: 0,
                    skipped: 0,
                    remaining: 0,
                    complete: true,
                });
            }
            ImportState::Validating => {
                return Err(SyncError::UserError(
                    "apply() called before validate()".to_string(),
                ));
            }
            ImportState::Aborted => {
                return Err(SyncError::UserError(
                    "apply() called on an aborted import; fix the validation errors and diff again"
                        .to_string(),
                ));
            }
        }

        self.state = ImportState::Applying;

        let mut applied = 0;
        let mut skipped = 0;

        while self.cursor < self.changelist.len() {
            if let Some(limit) = limit
                && applied >= limit
            {
                break;
            }

            if matches!(
                self.results.get(self.cursor),
                Some(ImportValidationResult::Skipped)
            ) {
                self.cursor += 1;
                skipped += 1;
                continue;
            }

            let entry = self.changelist.entries()[self.cursor].clone();
            if let Err(error) = self.apply_entry(&entry, active, sync) {
                self.state = ImportState::PartiallyApplied;
                return Err(error);
            }

            self.cursor += 1;
            applied += 1;
        }

        if self.cursor == self.changelist.len() {
            self.state = ImportState::Completed;
        }

        Ok(ApplyProgress {
            applied,
            skipped,
            remaining: self.changelist.len() - self.cursor,
            complete: self.state == ImportState::Completed,
        })
    }

    fn apply_entry(
        &self,
        entry: &ChangelistEntry,
        active: &mut dyn ConfigStorage,
        sync: &dyn ConfigStorage,
    ) -> Result<()> {
        match &entry.op {
            ChangeOp::Delete => {
                active.delete(&entry.collection, &entry.name)?;
            }
            ChangeOp::Create | ChangeOp::Update => {
                let data = self.read_sync_data(sync, entry)?;
                active.write(&entry.collection, &entry.name, &data)?;
            }
            ChangeOp::Rename { old_name } => {
                // Delete-old plus create-new as a single unit; a failure in
                // either half fails the whole entry.
                let data = self.read_sync_data(sync, entry)?;
                active.delete(&entry.collection, old_name)?;
                active.write(&entry.collection, &entry.name, &data)?;
            }
        }
        Ok(())
    }

    fn read_sync_data(
        &self,
        sync: &dyn ConfigStorage,
        entry: &ChangelistEntry,
    ) -> Result<serde_yaml::Value> {
        let object = sync.read(&entry.collection, &entry.name)?.ok_or_else(|| {
            SyncError::StorageRead(format!(
                "'{}' disappeared from the sync storage mid-import",
                entry.name
            ))
        })?;
        Ok(object.data().clone())
    }
}
