//! Config object model for confsync.
//!
//! A config object is a named, structured configuration record (e.g. a
//! content type definition). Objects are stored as YAML documents and
//! carry two reserved keys inside their data:
//!
//! - `uuid`: stable identity used for rename detection across imports
//! - `dependencies`: declared dependency metadata (module, theme, config,
//!   content, enforced)
//!
//! Names follow a dotted-namespace convention (`node.type.article`) and
//! are immutable once an object is created. Content comparison uses a
//! canonical hash with recursively sorted mapping keys, so key-order-only
//! differences never register as changes.

use crate::error::{Result, SyncError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::LazyLock;
use uuid::Uuid;

/// The default collection. Override collections (e.g. `language.fr`) are
/// named; the default is the empty string.
pub const DEFAULT_COLLECTION: &str = "";

/// Regex pattern for valid config object names: at least two lowercase
/// dotted segments.
static CONFIG_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+(\.[a-z0-9_]+)+$").expect("invalid name regex"));

/// Check whether a string is a valid config object name.
pub fn is_valid_name(name: &str) -> bool {
    CONFIG_NAME_REGEX.is_match(name)
}

/// Check whether a string is a valid collection name.
///
/// The default collection is the empty string; named collections follow the
/// same dotted convention as config names but also allow a single segment
/// (e.g. `preview`).
pub fn is_valid_collection(collection: &str) -> bool {
    collection == DEFAULT_COLLECTION
        || collection
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'))
}

/// Declared dependency metadata for a config object.
///
/// Mirrors the reserved `dependencies` key. Unknown keys in the YAML are
/// ignored for forward compatibility; absent lists default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    /// Names of modules this object requires.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub module: Vec<String>,

    /// Names of themes this object requires.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub theme: Vec<String>,

    /// Names of other config objects this object depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<String>,

    /// UUIDs of content entities this object references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<String>,

    /// Dependencies enforced by a collaborator rather than derived from the
    /// object's own data. Kept verbatim across dependency recalculation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforced: Option<Box<DependencySet>>,
}

impl DependencySet {
    /// All config dependencies, declared plus enforced, sorted and deduplicated.
    pub fn effective_config(&self) -> Vec<String> {
        let mut names = self.config.clone();
        if let Some(enforced) = &self.enforced {
            names.extend(enforced.config.iter().cloned());
        }
        names.sort();
        names.dedup();
        names
    }

    /// All module dependencies, declared plus enforced, sorted and deduplicated.
    pub fn effective_module(&self) -> Vec<String> {
        let mut names = self.module.clone();
        if let Some(enforced) = &self.enforced {
            names.extend(enforced.module.iter().cloned());
        }
        names.sort();
        names.dedup();
        names
    }

    /// True when no dependency of any kind is declared.
    pub fn is_empty(&self) -> bool {
        self.module.is_empty()
            && self.theme.is_empty()
            && self.config.is_empty()
            && self.content.is_empty()
            && self.enforced.as_ref().is_none_or(|e| e.is_empty())
    }

    /// Sort and deduplicate every list in place.
    pub fn normalize(&mut self) {
        self.module.sort();
        self.module.dedup();
        self.theme.sort();
        self.theme.dedup();
        self.config.sort();
        self.config.dedup();
        self.content.sort();
        self.content.dedup();
        if let Some(enforced) = &mut self.enforced {
            enforced.normalize();
        }
    }
}

/// A named config object with arbitrary nested mapping data.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigObject {
    name: String,
    data: Value,
}

impl ConfigObject {
    /// Create a config object from a name and YAML data.
    ///
    /// The name must follow the dotted-namespace convention and the data
    /// must be a mapping (a YAML `null` is accepted as an empty mapping).
    pub fn new(name: &str, data: Value) -> Result<Self> {
        if !is_valid_name(name) {
            return Err(SyncError::UserError(format!(
                "invalid config object name '{}': expected lowercase dotted segments like 'node.type.article'",
                name
            )));
        }

        let data = match data {
            Value::Null => Value::Mapping(serde_yaml::Mapping::new()),
            Value::Mapping(_) => data,
            other => {
                return Err(SyncError::UserError(format!(
                    "config object '{}' data must be a mapping, got {}",
                    name,
                    value_kind(&other)
                )));
            }
        };

        Ok(Self {
            name: name.to_string(),
            data,
        })
    }

    /// Parse a config object from a YAML document.
    pub fn from_yaml(name: &str, yaml: &str) -> Result<Self> {
        let data: Value = serde_yaml::from_str(yaml).map_err(|e| {
            SyncError::StorageRead(format!("failed to parse config object '{}': {}", name, e))
        })?;
        Self::new(name, data)
    }

    /// Serialize the object data to a YAML document.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.data).map_err(|e| {
            SyncError::StorageWrite(format!(
                "failed to serialize config object '{}': {}",
                self.name, e
            ))
        })
    }

    /// The immutable object name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw nested data.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The object's uuid, when present and parseable.
    pub fn uuid(&self) -> Option<Uuid> {
        match key_of(&self.data, "uuid") {
            Some(Value::String(s)) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    /// The declared dependency metadata, empty when absent or malformed in
    /// a recoverable way.
    pub fn dependencies(&self) -> DependencySet {
        match key_of(&self.data, "dependencies") {
            Some(value) => serde_yaml::from_value(value.clone()).unwrap_or_default(),
            None => DependencySet::default(),
        }
    }

    /// Replace the `dependencies` key with the given set.
    pub fn set_dependencies(&mut self, deps: &DependencySet) -> Result<()> {
        let value = serde_yaml::to_value(deps).map_err(|e| {
            SyncError::UserError(format!(
                "failed to serialize dependencies for '{}': {}",
                self.name, e
            ))
        })?;
        if let Value::Mapping(map) = &mut self.data {
            if deps.is_empty() {
                map.remove(&Value::String("dependencies".to_string()));
            } else {
                map.insert(Value::String("dependencies".to_string()), value);
            }
        }
        Ok(())
    }

    /// Look up a value at a dotted path (e.g. `settings.target_bundle`).
    pub fn value_at_path(&self, path: &str) -> Option<&Value> {
        let mut current = &self.data;
        for segment in path.split('.') {
            current = key_of(current, segment)?;
        }
        Some(current)
    }

    /// Stable content hash over the canonicalized data.
    ///
    /// Mapping keys are sorted recursively before hashing, so two objects
    /// whose data differ only in key order hash identically.
    pub fn canonical_hash(&self) -> String {
        let mut canonical = String::new();
        write_canonical(&self.data, &mut canonical);

        let digest = Sha256::digest(canonical.as_bytes());
        let mut hex = String::with_capacity(64);
        for byte in digest {
            let _ = write!(hex, "{:02x}", byte);
        }
        hex
    }
}

/// Look up a string key in a YAML mapping value.
fn key_of<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Mapping(map) => map.get(&Value::String(key.to_string())),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Render a value into a canonical single-line form with sorted mapping keys.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push('~'),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => {
            let _ = write!(out, "{:?}", s);
        }
        Value::Sequence(seq) => {
            out.push('[');
            for (i, item) in seq.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Mapping(map) => {
            let mut entries: Vec<(String, &Value)> = map
                .iter()
                .map(|(k, v)| {
                    let mut key = String::new();
                    write_canonical(k, &mut key);
                    (key, v)
                })
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            out.push('{');
            for (i, (key, v)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(key);
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Tagged(tagged) => {
            let _ = write!(out, "!{} ", tagged.tag);
            write_canonical(&tagged.value, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, yaml: &str) -> ConfigObject {
        ConfigObject::from_yaml(name, yaml).unwrap()
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("system.site"));
        assert!(is_valid_name("node.type.article"));
        assert!(is_valid_name("field.field.node_body"));
        assert!(is_valid_name("views.view.content_2"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("single"));
        assert!(!is_valid_name("Node.Type"));
        assert!(!is_valid_name("node..type"));
        assert!(!is_valid_name("node.type."));
        assert!(!is_valid_name(".node.type"));
        assert!(!is_valid_name("node type.article"));
    }

    #[test]
    fn test_collection_names() {
        assert!(is_valid_collection(""));
        assert!(is_valid_collection("preview"));
        assert!(is_valid_collection("language.fr"));
        assert!(!is_valid_collection("Language.FR"));
        assert!(!is_valid_collection("language..fr"));
    }

    #[test]
    fn test_new_rejects_invalid_name() {
        let result = ConfigObject::new("Bad Name", Value::Null);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("invalid config object name"));
    }

    #[test]
    fn test_new_rejects_non_mapping_data() {
        let result = ConfigObject::new("a.b", Value::String("scalar".to_string()));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must be a mapping"));
    }

    #[test]
    fn test_null_data_becomes_empty_mapping() {
        let obj = ConfigObject::new("a.b", Value::Null).unwrap();
        assert!(matches!(obj.data(), Value::Mapping(m) if m.is_empty()));
    }

    #[test]
    fn test_uuid_parsing() {
        let obj = object(
            "node.type.article",
            "uuid: 7c1d6f8a-52a7-4653-9809-1f3c09a7e4d1\nlabel: Article\n",
        );
        assert_eq!(
            obj.uuid().unwrap().to_string(),
            "7c1d6f8a-52a7-4653-9809-1f3c09a7e4d1"
        );
    }

    #[test]
    fn test_invalid_uuid_is_none() {
        let obj = object("node.type.article", "uuid: not-a-uuid\n");
        assert!(obj.uuid().is_none());
    }

    #[test]
    fn test_missing_uuid_is_none() {
        let obj = object("node.type.article", "label: Article\n");
        assert!(obj.uuid().is_none());
    }

    #[test]
    fn test_dependencies_parsing() {
        let obj = object(
            "field.field.node_body",
            r#"
label: Body
dependencies:
  module:
    - text
  config:
    - node.type.article
    - field.storage.node_body
"#,
        );
        let deps = obj.dependencies();
        assert_eq!(deps.module, vec!["text"]);
        assert_eq!(
            deps.config,
            vec!["node.type.article", "field.storage.node_body"]
        );
        assert!(deps.theme.is_empty());
        assert!(deps.enforced.is_none());
    }

    #[test]
    fn test_enforced_dependencies_merge_into_effective() {
        let obj = object(
            "views.view.content",
            r#"
dependencies:
  config:
    - node.type.article
  enforced:
    config:
      - system.menu.main
    module:
      - views
"#,
        );
        let deps = obj.dependencies();
        assert_eq!(
            deps.effective_config(),
            vec!["node.type.article", "system.menu.main"]
        );
        assert_eq!(deps.effective_module(), vec!["views"]);
    }

    #[test]
    fn test_missing_dependencies_block_is_empty() {
        let obj = object("system.site", "name: My Site\n");
        assert!(obj.dependencies().is_empty());
    }

    #[test]
    fn test_canonical_hash_ignores_key_order() {
        let a = object("a.b", "first: 1\nsecond: 2\nnested:\n  x: true\n  y: false\n");
        let b = object("a.b", "nested:\n  y: false\n  x: true\nsecond: 2\nfirst: 1\n");
        assert_eq!(a.canonical_hash(), b.canonical_hash());
    }

    #[test]
    fn test_canonical_hash_detects_value_change() {
        let a = object("a.b", "first: 1\n");
        let b = object("a.b", "first: 2\n");
        assert_ne!(a.canonical_hash(), b.canonical_hash());
    }

    #[test]
    fn test_canonical_hash_detects_sequence_order() {
        // Sequence order is meaningful, unlike mapping key order.
        let a = object("a.b", "items:\n  - one\n  - two\n");
        let b = object("a.b", "items:\n  - two\n  - one\n");
        assert_ne!(a.canonical_hash(), b.canonical_hash());
    }

    #[test]
    fn test_canonical_hash_is_stable() {
        let obj = object("a.b", "first: 1\nsecond: [1, 2, 3]\n");
        assert_eq!(obj.canonical_hash(), obj.canonical_hash());
    }

    #[test]
    fn test_value_at_path() {
        let obj = object(
            "field.field.node_body",
            "settings:\n  handler: default\n  target_bundle: article\n",
        );
        assert_eq!(
            obj.value_at_path("settings.target_bundle"),
            Some(&Value::String("article".to_string()))
        );
        assert!(obj.value_at_path("settings.missing").is_none());
        assert!(obj.value_at_path("missing.path").is_none());
    }

    #[test]
    fn test_set_dependencies_round_trip() {
        let mut obj = object("a.b", "label: Test\n");
        let mut deps = DependencySet::default();
        deps.config = vec!["c.d".to_string()];
        obj.set_dependencies(&deps).unwrap();

        assert_eq!(obj.dependencies().config, vec!["c.d"]);
    }

    #[test]
    fn test_set_empty_dependencies_removes_key() {
        let mut obj = object("a.b", "dependencies:\n  config:\n    - c.d\n");
        obj.set_dependencies(&DependencySet::default()).unwrap();

        let yaml = obj.to_yaml().unwrap();
        assert!(!yaml.contains("dependencies"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let obj = object("node.type.article", "label: Article\nstatus: true\n");
        let yaml = obj.to_yaml().unwrap();
        let reparsed = ConfigObject::from_yaml("node.type.article", &yaml).unwrap();
        assert_eq!(obj.canonical_hash(), reparsed.canonical_hash());
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let mut deps = DependencySet {
            config: vec!["b.b".to_string(), "a.a".to_string(), "b.b".to_string()],
            ..Default::default()
        };
        deps.normalize();
        assert_eq!(deps.config, vec!["a.a", "b.b"]);
    }
}
