//! Config storage abstraction for confsync.
//!
//! A storage holds named config objects partitioned into collections: the
//! default collection plus any number of named override collections (e.g.
//! per-language). The same name may exist independently in each collection.
//!
//! The core only depends on this trait; the persistence medium is a
//! collaborator concern. `FileStorage` keeps one YAML file per object,
//! `MemoryStorage` backs tests and in-process tooling.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;
use crate::object::ConfigObject;
use serde_yaml::Value;

/// Key-value persistence contract for named config objects.
///
/// Reads report `Ok(None)` for missing objects; errors are reserved for
/// actual storage failures (I/O, parse). Listings are sorted so diff and
/// import output is deterministic.
pub trait ConfigStorage {
    /// Read one object from a collection.
    fn read(&self, collection: &str, name: &str) -> Result<Option<ConfigObject>>;

    /// Write one object's data into a collection, replacing any existing data.
    fn write(&mut self, collection: &str, name: &str, data: &Value) -> Result<()>;

    /// Delete one object from a collection. Returns whether it existed.
    fn delete(&mut self, collection: &str, name: &str) -> Result<bool>;

    /// List object names in a collection with the given prefix, sorted.
    /// An empty prefix lists everything.
    fn list_all(&self, collection: &str, prefix: &str) -> Result<Vec<String>>;

    /// All collection names present in this storage, sorted, with the
    /// default collection first.
    fn collection_names(&self) -> Result<Vec<String>>;

    /// Whether an object exists in a collection.
    fn exists(&self, collection: &str, name: &str) -> Result<bool> {
        Ok(self.read(collection, name)?.is_some())
    }
}

/// Read every object of one collection, in listing order.
///
/// Shared by the comparer (graph construction needs the full set) and the
/// importer's validation phase.
pub fn read_collection(
    storage: &dyn ConfigStorage,
    collection: &str,
) -> Result<Vec<ConfigObject>> {
    let mut objects = Vec::new();
    for name in storage.list_all(collection, "")? {
        if let Some(object) = storage.read(collection, &name)? {
            objects.push(object);
        }
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DEFAULT_COLLECTION;

    #[test]
    fn test_read_collection_returns_listing_order() {
        let mut storage = MemoryStorage::new();
        let data: Value = serde_yaml::from_str("label: X\n").unwrap();
        storage.write(DEFAULT_COLLECTION, "b.b", &data).unwrap();
        storage.write(DEFAULT_COLLECTION, "a.a", &data).unwrap();

        let objects = read_collection(&storage, DEFAULT_COLLECTION).unwrap();
        let names: Vec<&str> = objects.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["a.a", "b.b"]);
    }

    #[test]
    fn test_exists_default_impl() {
        let mut storage = MemoryStorage::new();
        let data: Value = serde_yaml::from_str("label: X\n").unwrap();
        storage.write(DEFAULT_COLLECTION, "a.a", &data).unwrap();

        assert!(storage.exists(DEFAULT_COLLECTION, "a.a").unwrap());
        assert!(!storage.exists(DEFAULT_COLLECTION, "b.b").unwrap());
    }
}
