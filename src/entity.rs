//! Config entity layer.
//!
//! A config entity wraps a config object with typed behavior: identity,
//! dependency metadata, and third-party settings. Entity types are
//! declarative capability records (name prefix, reference paths, required
//! keys) registered from project settings; dependency discovery evaluates
//! those declared paths instead of introspecting arbitrary nested data.

use crate::object::{ConfigObject, DependencySet, is_valid_name};
use crate::settings::EntityTypeDef;
use serde_yaml::Value;
use uuid::Uuid;

/// Registry of declarative entity-type definitions.
#[derive(Debug, Clone, Default)]
pub struct EntityTypeRegistry {
    types: Vec<EntityTypeDef>,
}

impl EntityTypeRegistry {
    /// Build a registry from settings definitions.
    pub fn new(types: Vec<EntityTypeDef>) -> Self {
        Self { types }
    }

    /// Find the type owning a config name. When several prefixes match,
    /// the longest (most specific) wins.
    pub fn type_of(&self, name: &str) -> Option<&EntityTypeDef> {
        self.types
            .iter()
            .filter(|def| name.starts_with(&def.prefix))
            .max_by_key(|def| def.prefix.len())
    }
}

/// A config object with typed accessors and dependency derivation.
#[derive(Debug, Clone)]
pub struct ConfigEntity {
    object: ConfigObject,
}

impl ConfigEntity {
    pub fn new(object: ConfigObject) -> Self {
        Self { object }
    }

    pub fn object(&self) -> &ConfigObject {
        &self.object
    }

    pub fn into_object(self) -> ConfigObject {
        self.object
    }

    pub fn name(&self) -> &str {
        self.object.name()
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.object.uuid()
    }

    /// The dependency metadata currently declared in the object data.
    pub fn dependencies(&self) -> DependencySet {
        self.object.dependencies()
    }

    /// Providers with third-party settings attached to this entity.
    pub fn third_party_providers(&self) -> Vec<String> {
        match self.object.value_at_path("third_party_settings") {
            Some(Value::Mapping(map)) => {
                let mut providers: Vec<String> = map
                    .iter()
                    .filter_map(|(k, _)| match k {
                        Value::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect();
                providers.sort();
                providers
            }
            _ => Vec::new(),
        }
    }

    /// Derive the dependency set from references found in the entity's own
    /// data, per its registered type.
    ///
    /// - values at config-reference paths become `config` dependencies
    ///   (with the path's prefix prepended when configured);
    /// - values at content-reference paths that parse as UUIDs become
    ///   `content` dependencies;
    /// - third-party providers become `module` dependencies.
    ///
    /// Enforced dependencies declared on the object are carried over
    /// verbatim. The result is sorted and deduplicated, so the derivation
    /// is idempotent: unchanged data always yields the same set.
    pub fn calculate_dependencies(&self, registry: &EntityTypeRegistry) -> DependencySet {
        let mut deps = DependencySet {
            module: self.third_party_providers(),
            enforced: self.object.dependencies().enforced,
            ..Default::default()
        };

        if let Some(def) = registry.type_of(self.name()) {
            for reference in &def.config_reference_paths {
                for value in string_values_at(&self.object, &reference.path) {
                    let target = match &reference.prefix {
                        Some(prefix) => format!("{}{}", prefix, value),
                        None => value,
                    };
                    // Values that do not form a config name reference
                    // something else entirely; they are not dependencies.
                    if is_valid_name(&target) && target != self.name() {
                        deps.config.push(target);
                    }
                }
            }

            for path in &def.content_reference_paths {
                for value in string_values_at(&self.object, path) {
                    if Uuid::parse_str(&value).is_ok() {
                        deps.content.push(value);
                    }
                }
            }
        }

        deps.normalize();
        deps
    }

    /// Recalculate and write the dependency set back into the object data.
    pub fn refresh_dependencies(&mut self, registry: &EntityTypeRegistry) -> crate::error::Result<()> {
        let deps = self.calculate_dependencies(registry);
        self.object.set_dependencies(&deps)
    }
}

/// Collect string values at a dotted path: a plain string yields itself, a
/// sequence yields its string items.
fn string_values_at(object: &ConfigObject, path: &str) -> Vec<String> {
    match object.value_at_path(path) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
