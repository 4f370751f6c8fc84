//! In-memory config storage.
//!
//! BTreeMap-backed so listings are naturally sorted. Used by tests and by
//! tooling that assembles a staged snapshot in process.

use super::ConfigStorage;
use crate::error::{Result, SyncError};
use crate::object::{self, ConfigObject, DEFAULT_COLLECTION};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// BTreeMap-backed storage, one map per collection.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    collections: BTreeMap<String, BTreeMap<String, Value>>,
}

impl MemoryStorage {
    /// Create an empty storage with just the default collection.
    pub fn new() -> Self {
        let mut collections = BTreeMap::new();
        collections.insert(DEFAULT_COLLECTION.to_string(), BTreeMap::new());
        Self { collections }
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

impl ConfigStorage for MemoryStorage {
    fn read(&self, collection: &str, name: &str) -> Result<Option<ConfigObject>> {
        match self
            .collections
            .get(collection)
            .and_then(|objects| objects.get(name))
        {
            Some(data) => Ok(Some(ConfigObject::new(name, data.clone())?)),
            None => Ok(None),
        }
    }

    fn write(&mut self, collection: &str, name: &str, data: &Value) -> Result<()> {
        Self::check_names(collection, name)?;
        // Validate the data shape the same way the file backend would on read.
        let object = ConfigObject::new(name, data.clone())?;
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(name.to_string(), object.data().clone());
        Ok(())
    }

    fn delete(&mut self, collection: &str, name: &str) -> Result<bool> {
        Ok(self
            .collections
            .get_mut(collection)
            .is_some_and(|objects| objects.remove(name).is_some()))
    }

    fn list_all(&self, collection: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .collections
            .get(collection)
            .map(|objects| {
                objects
                    .keys()
                    .filter(|name| name.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .iter()
            .filter(|(name, objects)| name.as_str() == DEFAULT_COLLECTION || !objects.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        // BTreeMap order already puts the default (empty string) first.
        names.sort();
        Ok(names)
    }
}
