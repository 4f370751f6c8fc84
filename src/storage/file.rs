//! File-based config storage.
//!
//! One YAML file per object, named `{name}.yml`. The default collection
//! lives at the storage root; each override collection is a subdirectory
//! named after the collection. Writes go through the atomic write
//! primitive so a crash never leaves a truncated object behind.

use super::ConfigStorage;
use crate::error::{Result, SyncError};
use crate::fs::atomic_write_file;
use crate::object::{self, ConfigObject, DEFAULT_COLLECTION};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension used for object files.
const OBJECT_EXTENSION: &str = "yml";

/// Directory-per-collection, file-per-object storage.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open a storage rooted at the given directory.
    ///
    /// The directory does not need to exist yet; it is created on first
    /// write. Reads against a missing root behave as an empty storage.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        if collection == DEFAULT_COLLECTION {
            self.root.clone()
        } else {
            self.root.join(collection)
        }
    }

    fn object_path(&self, collection: &str, name: &str) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.{}", name, OBJECT_EXTENSION))
    }

    fn check_names(collection: &str, name: &str) -> Result<()> {
        if !object::is_valid_collection(collection) {
            return Err(SyncError::UserError(format!(
                "invalid collection name '{}'",
                collection
            )));
        }
        if !object::is_valid_name(name) {
            return Err(SyncError::UserError(format!(
                "invalid config object name '{}'",
                name
            )));
        }
        Ok(())
    }
}

impl ConfigStorage for FileStorage {
    fn read(&self, collection: &str, name: &str) -> Result<Option<ConfigObject>> {
        let path = self.object_path(collection, name);
        if !path.is_file() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            SyncError::StorageRead(format!("failed to read '{}': {}", path.display(), e))
        })?;

        Ok(Some(ConfigObject::from_yaml(name, &content)?))
    }

    fn write(&mut self, collection: &str, name: &str, data: &Value) -> Result<()> {
        Self::check_names(collection, name)?;

        let object = ConfigObject::new(name, data.clone())?;
        let yaml = object.to_yaml()?;
        atomic_write_file(self.object_path(collection, name), &yaml)
    }

    fn delete(&mut self, collection: &str, name: &str) -> Result<bool> {
        let path = self.object_path(collection, name);
        if !path.is_file() {
            return Ok(false);
        }

        fs::remove_file(&path).map_err(|e| {
            SyncError::StorageWrite(format!("failed to delete '{}': {}", path.display(), e))
        })?;
        Ok(true)
    }

    fn list_all(&self, collection: &str, prefix: &str) -> Result<Vec<String>> {
        let dir = self.collection_dir(collection);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| {
            SyncError::StorageRead(format!("failed to read '{}': {}", dir.display(), e))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                SyncError::StorageRead(format!("failed to read directory entry: {}", e))
            })?;
            let path = entry.path();

            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(OBJECT_EXTENSION)
            {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            // Skip temp files and anything that is not a config name.
            if object::is_valid_name(stem) && stem.starts_with(prefix) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        let mut names = vec![DEFAULT_COLLECTION.to_string()];
        if !self.root.is_dir() {
            return Ok(names);
        }

        let entries = fs::read_dir(&self.root).map_err(|e| {
            SyncError::StorageRead(format!("failed to read '{}': {}", self.root.display(), e))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                SyncError::StorageRead(format!("failed to read directory entry: {}", e))
            })?;
            let path = entry.path();

            if !path.is_dir() {
                continue;
            }
            if let Some(dirname) = path.file_name().and_then(|n| n.to_str())
                && object::is_valid_collection(dirname)
            {
                names.push(dirname.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}
