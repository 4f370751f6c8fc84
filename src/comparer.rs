//! Storage comparison and changelist construction.
//!
//! Diffs two config storages (active vs. staged/sync) per collection and
//! produces an ordered changelist of create, update, delete, and rename
//! operations. The comparer is read-only against both storages; the
//! changelist it returns is consumed by one importer and then discarded.
//!
//! Ordering contract:
//! - deletes come first, in reverse dependency order of the active set
//!   (dependents before dependencies), so nothing is deleted while still
//!   referenced;
//! - creates and updates follow, in dependency order of the sync set
//!   (dependencies before dependents);
//! - renames order with creates/updates under their new name.
//!
//! Content comparison uses the canonical hash, so key-order-only
//! differences never produce spurious updates. Rename detection matches
//! the uuid of a create candidate against the uuids of delete candidates
//! in the same collection.

use crate::error::Result;
use crate::graph::DependencyManager;
use crate::object::ConfigObject;
use crate::storage::{ConfigStorage, read_collection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One changelist operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
    /// The object at `old_name` becomes this entry's name, keeping its
    /// uuid; any data change rides along in the same entry.
    Rename {
        old_name: String,
    },
}

impl ChangeOp {
    /// Operation keyword used in the export format.
    pub fn keyword(&self) -> &'static str {
        match self {
            ChangeOp::Create => "create",
            ChangeOp::Update => "update",
            ChangeOp::Delete => "delete",
            ChangeOp::Rename { .. } => "rename",
        }
    }
}

/// One entry of the changelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelistEntry {
    /// Collection the operation applies to.
    pub collection: String,
    /// Target object name (the new name, for renames).
    pub name: String,
    /// The operation.
    pub op: ChangeOp,
}

impl ChangelistEntry {
    /// Render as `operation collection/name` for human output.
    pub fn describe(&self) -> String {
        let name = if self.collection.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.collection, self.name)
        };
        match &self.op {
            ChangeOp::Rename { old_name } => {
                format!("{:<7} {} (was {})", self.op.keyword(), name, old_name)
            }
            _ => format!("{:<7} {}", self.op.keyword(), name),
        }
    }
}

/// Wire/tooling form of one changelist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelistExportEntry {
    pub operation: String,
    pub collection: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
}

impl From<&ChangelistEntry> for ChangelistExportEntry {
    fn from(entry: &ChangelistEntry) -> Self {
        Self {
            operation: entry.op.keyword().to_string(),
            collection: entry.collection.clone(),
            name: entry.name.clone(),
            old_name: match &entry.op {
                ChangeOp::Rename { old_name } => Some(old_name.clone()),
                _ => None,
            },
        }
    }
}

impl TryFrom<ChangelistExportEntry> for ChangelistEntry {
    type Error = crate::error::SyncError;

    fn try_from(entry: ChangelistExportEntry) -> Result<Self> {
        let op = match entry.operation.as_str() {
            "create" => ChangeOp::Create,
            "update" => ChangeOp::Update,
            "delete" => ChangeOp::Delete,
            "rename" => ChangeOp::Rename {
                old_name: entry.old_name.ok_or_else(|| {
                    crate::error::SyncError::UserError(format!(
                        "rename entry for '{}' is missing old_name",
                        entry.name
                    ))
                })?,
            },
            other => {
                return Err(crate::error::SyncError::UserError(format!(
                    "unknown changelist operation '{}'",
                    other
                )));
            }
        };

        Ok(Self {
            collection: entry.collection,
            name: entry.name,
            op,
        })
    }
}

/// Ordered list of operations produced by one comparison pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changelist {
    entries: Vec<ChangelistEntry>,
}

impl Changelist {
    pub fn new(entries: Vec<ChangelistEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ChangelistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The export form: ordered `{operation, collection, name, old_name?}`.
    pub fn to_export(&self) -> Vec<ChangelistExportEntry> {
        self.entries.iter().map(ChangelistExportEntry::from).collect()
    }

    /// Rebuild a changelist from its export form.
    pub fn from_export(entries: Vec<ChangelistExportEntry>) -> Result<Self> {
        let entries: Result<Vec<ChangelistEntry>> =
            entries.into_iter().map(ChangelistEntry::try_from).collect();
        Ok(Self::new(entries?))
    }
}

/// Read-only diff between an active and a sync storage.
pub struct StorageComparer<'a> {
    active: &'a dyn ConfigStorage,
    sync: &'a dyn ConfigStorage,
}

impl<'a> StorageComparer<'a> {
    pub fn new(active: &'a dyn ConfigStorage, sync: &'a dyn ConfigStorage) -> Self {
        Self { active, sync }
    }

    /// Compute the ordered changelist across all collections.
    pub fn create_changelist(&self) -> Result<Changelist> {
        let mut collections: BTreeSet<String> = BTreeSet::new();
        collections.extend(self.active.collection_names()?);
        collections.extend(self.sync.collection_names()?);

        let mut entries = Vec::new();
        // BTreeSet iteration puts the default collection ("") first.
        for collection in &collections {
            self.diff_collection(collection, &mut entries)?;
        }

        Ok(Changelist::new(entries))
    }

    fn diff_collection(&self, collection: &str, entries: &mut Vec<ChangelistEntry>) -> Result<()> {
        let active_objects = read_collection(self.active, collection)?;
        let sync_objects = read_collection(self.sync, collection)?;

        let active_by_name: BTreeMap<&str, &ConfigObject> =
            active_objects.iter().map(|o| (o.name(), o)).collect();
        let sync_by_name: BTreeMap<&str, &ConfigObject> =
            sync_objects.iter().map(|o| (o.name(), o)).collect();

        let mut creates: BTreeSet<&str> = BTreeSet::new();
        let mut deletes: BTreeSet<&str> = BTreeSet::new();
        let mut updates: BTreeSet<&str> = BTreeSet::new();

        for (&name, sync_obj) in &sync_by_name {
            match active_by_name.get(name) {
                None => {
                    creates.insert(name);
                }
                Some(active_obj) => {
                    if active_obj.canonical_hash() != sync_obj.canonical_hash() {
                        updates.insert(name);
                    }
                }
            }
        }
        for &name in active_by_name.keys() {
            if !sync_by_name.contains_key(name) {
                deletes.insert(name);
            }
        }

        // Rename detection: a create candidate carrying the uuid of a
        // delete candidate is the same object under a new name.
        let mut renames: BTreeMap<&str, String> = BTreeMap::new();
        let mut deleted_uuids: HashMap<uuid::Uuid, &str> = HashMap::new();
        for &name in &deletes {
            if let Some(uuid) = active_by_name[name].uuid() {
                deleted_uuids.entry(uuid).or_insert(name);
            }
        }
        let create_candidates: Vec<&str> = creates.iter().copied().collect();
        for name in create_candidates {
            if let Some(uuid) = sync_by_name[name].uuid()
                && let Some(old_name) = deleted_uuids.remove(&uuid)
            {
                renames.insert(name, old_name.to_string());
                creates.remove(name);
                deletes.remove(old_name);
            }
        }

        // Deletes first, dependents before their dependencies.
        let active_manager = DependencyManager::build(&active_objects)?;
        let mut delete_order = active_manager.topological_order()?;
        delete_order.reverse();
        for name in delete_order {
            if deletes.contains(name.as_str()) {
                entries.push(ChangelistEntry {
                    collection: collection.to_string(),
                    name,
                    op: ChangeOp::Delete,
                });
            }
        }

        // Creates, updates, and renames in sync dependency order.
        let sync_manager = DependencyManager::build(&sync_objects)?;
        for name in sync_manager.topological_order()? {
            let op = if creates.contains(name.as_str()) {
                ChangeOp::Create
            } else if updates.contains(name.as_str()) {
                ChangeOp::Update
            } else if let Some(old_name) = renames.get(name.as_str()) {
                ChangeOp::Rename {
                    old_name: old_name.clone(),
                }
            } else {
                continue;
            };
            entries.push(ChangelistEntry {
                collection: collection.to_string(),
                name,
                op,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DEFAULT_COLLECTION;
    use crate::storage::MemoryStorage;
    use serde_yaml::Value;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    fn write(storage: &mut MemoryStorage, name: &str, text: &str) {
        storage.write(DEFAULT_COLLECTION, name, &yaml(text)).unwrap();
    }

    fn changelist(active: &MemoryStorage, sync: &MemoryStorage) -> Changelist {
        StorageComparer::new(active, sync).create_changelist().unwrap()
    }

    fn ops(list: &Changelist) -> Vec<(String, String)> {
        list.entries()
            .iter()
            .map(|e| (e.op.keyword().to_string(), e.name.clone()))
            .collect()
    }

    #[test]
    fn test_identical_storages_yield_empty_changelist() {
        let mut active = MemoryStorage::new();
        write(&mut active, "system.site", "name: My Site\n");
        let sync = active.clone();

        assert!(changelist(&active, &sync).is_empty());
    }

    #[test]
    fn test_self_diff_is_empty() {
        let mut active = MemoryStorage::new();
        write(&mut active, "system.site", "name: My Site\n");
        write(&mut active, "node.type.article", "label: Article\n");

        assert!(changelist(&active, &active).is_empty());
    }

    #[test]
    fn test_key_order_only_difference_is_not_an_update() {
        let mut active = MemoryStorage::new();
        write(&mut active, "system.site", "name: My Site\nslogan: Hello\n");
        let mut sync = MemoryStorage::new();
        write(&mut sync, "system.site", "slogan: Hello\nname: My Site\n");

        assert!(changelist(&active, &sync).is_empty());
    }

    #[test]
    fn test_create_update_delete_classification() {
        let mut active = MemoryStorage::new();
        write(&mut active, "keep.same", "x: 1\n");
        write(&mut active, "keep.changed", "x: 1\n");
        write(&mut active, "only.active", "x: 1\n");

        let mut sync = MemoryStorage::new();
        write(&mut sync, "keep.same", "x: 1\n");
        write(&mut sync, "keep.changed", "x: 2\n");
        write(&mut sync, "only.sync", "x: 1\n");

        let list = changelist(&active, &sync);
        let ops = ops(&list);
        assert!(ops.contains(&("delete".to_string(), "only.active".to_string())));
        assert!(ops.contains(&("update".to_string(), "keep.changed".to_string())));
        assert!(ops.contains(&("create".to_string(), "only.sync".to_string())));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_rename_detection_by_uuid() {
        let mut active = MemoryStorage::new();
        write(
            &mut active,
            "node.type.article",
            "uuid: 7c1d6f8a-52a7-4653-9809-1f3c09a7e4d1\nlabel: Article\n",
        );
        let mut sync = MemoryStorage::new();
        write(
            &mut sync,
            "node.type.story",
            "uuid: 7c1d6f8a-52a7-4653-9809-1f3c09a7e4d1\nlabel: Story\n",
        );

        let list = changelist(&active, &sync);
        assert_eq!(list.len(), 1);
        let entry = &list.entries()[0];
        assert_eq!(entry.name, "node.type.story");
        assert_eq!(
            entry.op,
            ChangeOp::Rename {
                old_name: "node.type.article".to_string()
            }
        );
    }

    #[test]
    fn test_different_uuids_are_delete_plus_create() {
        let mut active = MemoryStorage::new();
        write(
            &mut active,
            "node.type.article",
            "uuid: 7c1d6f8a-52a7-4653-9809-1f3c09a7e4d1\nlabel: Article\n",
        );
        let mut sync = MemoryStorage::new();
        write(
            &mut sync,
            "node.type.story",
            "uuid: 11111111-2222-4333-8444-555555555555\nlabel: Story\n",
        );

        let list = changelist(&active, &sync);
        assert_eq!(
            ops(&list),
            vec![
                ("delete".to_string(), "node.type.article".to_string()),
                ("create".to_string(), "node.type.story".to_string()),
            ]
        );
    }

    #[test]
    fn test_delete_order_dependents_first() {
        // field.field.body depends on node.type.article; its delete must
        // come first so nothing is deleted while still referenced.
        let mut active = MemoryStorage::new();
        write(&mut active, "node.type.article", "label: Article\n");
        write(
            &mut active,
            "field.field.body",
            "label: Body\ndependencies:\n  config:\n    - node.type.article\n",
        );
        let sync = MemoryStorage::new();

        let list = changelist(&active, &sync);
        assert_eq!(
            ops(&list),
            vec![
                ("delete".to_string(), "field.field.body".to_string()),
                ("delete".to_string(), "node.type.article".to_string()),
            ]
        );
    }

    #[test]
    fn test_update_then_dependent_create_order() {
        // active has x; sync has changed x and a new y depending on x.
        let mut active = MemoryStorage::new();
        write(&mut active, "node.type.article", "label: Article\n");

        let mut sync = MemoryStorage::new();
        write(&mut sync, "node.type.article", "label: Articles\n");
        write(
            &mut sync,
            "field.field.body",
            "label: Body\ndependencies:\n  config:\n    - node.type.article\n",
        );

        let list = changelist(&active, &sync);
        assert_eq!(
            ops(&list),
            vec![
                ("update".to_string(), "node.type.article".to_string()),
                ("create".to_string(), "field.field.body".to_string()),
            ]
        );
    }

    #[test]
    fn test_create_order_follows_dependency_chain() {
        let active = MemoryStorage::new();
        let mut sync = MemoryStorage::new();
        write(
            &mut sync,
            "views.view.content",
            "dependencies:\n  config:\n    - field.field.body\n",
        );
        write(
            &mut sync,
            "field.field.body",
            "dependencies:\n  config:\n    - node.type.article\n",
        );
        write(&mut sync, "node.type.article", "label: Article\n");

        let list = changelist(&active, &sync);
        assert_eq!(
            ops(&list),
            vec![
                ("create".to_string(), "node.type.article".to_string()),
                ("create".to_string(), "field.field.body".to_string()),
                ("create".to_string(), "views.view.content".to_string()),
            ]
        );
    }

    #[test]
    fn test_collections_diffed_independently() {
        let mut active = MemoryStorage::new();
        write(&mut active, "system.site", "name: Site\n");
        let mut sync = MemoryStorage::new();
        write(&mut sync, "system.site", "name: Site\n");
        sync.write("language.fr", "system.site", &yaml("name: Site FR\n"))
            .unwrap();

        let list = changelist(&active, &sync);
        assert_eq!(list.len(), 1);
        let entry = &list.entries()[0];
        assert_eq!(entry.collection, "language.fr");
        assert_eq!(entry.op, ChangeOp::Create);
    }

    #[test]
    fn test_export_format() {
        let mut active = MemoryStorage::new();
        write(
            &mut active,
            "node.type.article",
            "uuid: 7c1d6f8a-52a7-4653-9809-1f3c09a7e4d1\n",
        );
        let mut sync = MemoryStorage::new();
        write(
            &mut sync,
            "node.type.story",
            "uuid: 7c1d6f8a-52a7-4653-9809-1f3c09a7e4d1\nlabel: Story\n",
        );

        let export = changelist(&active, &sync).to_export();
        assert_eq!(export.len(), 1);
        assert_eq!(export[0].operation, "rename");
        assert_eq!(export[0].name, "node.type.story");
        assert_eq!(export[0].old_name.as_deref(), Some("node.type.article"));

        let json = serde_json::to_string(&export).unwrap();
        assert!(json.contains("\"operation\":\"rename\""));
        assert!(json.contains("\"old_name\":\"node.type.article\""));
    }

    #[test]
    fn test_export_round_trip() {
        let mut active = MemoryStorage::new();
        write(&mut active, "only.active", "x: 1\n");
        let mut sync = MemoryStorage::new();
        write(&mut sync, "only.sync", "x: 1\n");

        let list = changelist(&active, &sync);
        let rebuilt = Changelist::from_export(list.to_export()).unwrap();
        assert_eq!(rebuilt, list);
    }

    #[test]
    fn test_export_rejects_unknown_operation() {
        let entry = ChangelistExportEntry {
            operation: "destroy".to_string(),
            collection: String::new(),
            name: "a.b".to_string(),
            old_name: None,
        };
        assert!(Changelist::from_export(vec![entry]).is_err());
    }

    #[test]
    fn test_changelist_is_deterministic() {
        let mut active = MemoryStorage::new();
        write(&mut active, "only.active", "x: 1\n");
        let mut sync = MemoryStorage::new();
        write(&mut sync, "b.b", "x: 1\n");
        write(&mut sync, "a.a", "x: 1\n");

        let first = changelist(&active, &sync);
        for _ in 0..3 {
            assert_eq!(changelist(&active, &sync), first);
        }
    }
}
