//! Project settings for confsync.
//!
//! This module defines the Settings struct that represents `confsync.yaml`
//! at the project root. It supports forward-compatible YAML parsing
//! (unknown fields are ignored), sensible defaults for optional fields,
//! and validation of settings values.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A dotted data path that may reference another config object.
///
/// When `prefix` is set, the value found at `path` is an entity ID and the
/// referenced config name is `{prefix}{value}` (config references often
/// store only the ID, not the full name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePath {
    /// Dotted path into the object data (e.g. `settings.target_bundle`).
    pub path: String,

    /// Optional config-name prefix prepended to the value at `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Declarative capability record for one config entity type.
///
/// Replaces reflective dependency discovery: each type names the data paths
/// that may reference other config objects or content entities, plus the
/// top-level keys its schema requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityTypeDef {
    /// Config name prefix this type owns (e.g. `field.field.`).
    pub prefix: String,

    /// Paths whose values name other config objects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_reference_paths: Vec<ReferencePath>,

    /// Paths whose values are content entity UUIDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_reference_paths: Vec<String>,

    /// Top-level keys the schema requires to be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_keys: Vec<String>,
}

/// Project settings for confsync.
///
/// This struct represents the contents of `confsync.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // =========================================================================
    // Storage layout
    // =========================================================================
    /// Active configuration directory, relative to the project root.
    #[serde(default = "default_active_dir")]
    pub active_dir: String,

    /// Staged/sync configuration directory, relative to the project root.
    #[serde(default = "default_sync_dir")]
    pub sync_dir: String,

    /// State directory (locks, events, import snapshot), relative to root.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Minutes after which the sync lock is considered stale.
    #[serde(default = "default_lock_stale_minutes")]
    pub lock_stale_minutes: u32,

    // =========================================================================
    // Import settings
    // =========================================================================
    /// Default number of entries applied per `import` invocation.
    /// 0 applies the whole changelist in one pass.
    #[serde(default)]
    pub import_batch_size: usize,

    // =========================================================================
    // Entity types
    // =========================================================================
    /// Declarative entity-type definitions used for dependency calculation
    /// and schema validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_types: Vec<EntityTypeDef>,
}

fn default_active_dir() -> String {
    "config/active".to_string()
}
fn default_sync_dir() -> String {
    "config/sync".to_string()
}
fn default_state_dir() -> String {
    ".confsync".to_string()
}
fn default_lock_stale_minutes() -> u32 {
    120
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_dir: default_active_dir(),
            sync_dir: default_sync_dir(),
            state_dir: default_state_dir(),
            lock_stale_minutes: default_lock_stale_minutes(),
            import_batch_size: 0,
            entity_types: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::UserError(format!(
                "failed to read settings file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)
            .map_err(|e| SyncError::UserError(format!("failed to parse settings YAML: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| SyncError::UserError(format!("failed to serialize settings: {}", e)))
    }

    /// Validate settings values.
    ///
    /// Rules:
    /// - directory settings must be non-empty relative paths
    /// - `active_dir` and `sync_dir` must differ
    /// - `lock_stale_minutes` must be positive
    /// - entity type prefixes must be non-empty and unique
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("active_dir", &self.active_dir),
            ("sync_dir", &self.sync_dir),
            ("state_dir", &self.state_dir),
        ] {
            if value.is_empty() {
                return Err(SyncError::UserError(format!(
                    "settings validation failed: {} must be non-empty",
                    key
                )));
            }
            if Path::new(value).is_absolute() {
                return Err(SyncError::UserError(format!(
                    "settings validation failed: {} must be relative to the project root (found '{}')",
                    key, value
                )));
            }
        }

        if self.active_dir == self.sync_dir {
            return Err(SyncError::UserError(
                "settings validation failed: active_dir and sync_dir must differ".to_string(),
            ));
        }

        if self.lock_stale_minutes == 0 {
            return Err(SyncError::UserError(
                "settings validation failed: lock_stale_minutes must be greater than 0"
                    .to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for def in &self.entity_types {
            if def.prefix.is_empty() {
                return Err(SyncError::UserError(
                    "settings validation failed: entity_types entries must have a non-empty prefix"
                        .to_string(),
                ));
            }
            if !seen.insert(def.prefix.as_str()) {
                return Err(SyncError::UserError(format!(
                    "settings validation failed: duplicate entity type prefix '{}'",
                    def.prefix
                )));
            }
        }

        Ok(())
    }
}
