//! Schema validation collaborator.
//!
//! The importer treats schema validation as an opaque pass/fail oracle:
//! anything implementing `SchemaValidator` can veto an entry. The built-in
//! `RequiredKeyValidator` checks the declarative `required_keys` of the
//! entity-type registry; `NullValidator` accepts everything.

use crate::entity::EntityTypeRegistry;
use serde_yaml::Value;
use std::fmt;

/// One schema validation failure for a named config object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMessage {
    /// The config object the message is about.
    pub name: String,
    /// Human-readable description of the failure.
    pub message: String,
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Pass/fail oracle consulted for every create/update target.
pub trait SchemaValidator {
    /// Validate the data about to be written under `name`. An empty result
    /// means the data is acceptable.
    fn validate(&self, name: &str, data: &Value) -> Vec<ValidationMessage>;
}

/// Validator that accepts everything.
#[derive(Debug, Default)]
pub struct NullValidator;

impl SchemaValidator for NullValidator {
    fn validate(&self, _name: &str, _data: &Value) -> Vec<ValidationMessage> {
        Vec::new()
    }
}

/// Checks the `required_keys` declared for the object's entity type.
///
/// Objects whose name matches no registered type pass unchecked.
#[derive(Debug)]
pub struct RequiredKeyValidator {
    registry: EntityTypeRegistry,
}

impl RequiredKeyValidator {
    pub fn new(registry: EntityTypeRegistry) -> Self {
        Self { registry }
    }
}

impl SchemaValidator for RequiredKeyValidator {
    fn validate(&self, name: &str, data: &Value) -> Vec<ValidationMessage> {
        let Some(def) = self.registry.type_of(name) else {
            return Vec::new();
        };

        let mut messages = Vec::new();

        let Value::Mapping(map) = data else {
            messages.push(ValidationMessage {
                name: name.to_string(),
                message: "data must be a mapping".to_string(),
            });
            return messages;
        };

        for key in &def.required_keys {
            let present = map
                .get(&Value::String(key.clone()))
                .is_some_and(|v| !matches!(v, Value::Null));
            if !present {
                messages.push(ValidationMessage {
                    name: name.to_string(),
                    message: format!("the required key '{}' is missing", key),
                });
            }
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::EntityTypeDef;

    fn validator() -> RequiredKeyValidator {
        RequiredKeyValidator::new(EntityTypeRegistry::new(vec![EntityTypeDef {
            prefix: "node.type.".to_string(),
            required_keys: vec!["label".to_string(), "status".to_string()],
            ..Default::default()
        }]))
    }

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_null_validator_accepts_everything() {
        let messages = NullValidator.validate("a.b", &Value::Null);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_required_keys_present() {
        let messages = validator().validate("node.type.article", &yaml("label: Article\nstatus: true\n"));
        assert!(messages.is_empty());
    }

    #[test]
    fn test_missing_required_key() {
        let messages = validator().validate("node.type.article", &yaml("label: Article\n"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].name, "node.type.article");
        assert!(messages[0].message.contains("'status'"));
    }

    #[test]
    fn test_null_required_key_counts_as_missing() {
        let messages = validator().validate("node.type.article", &yaml("label: ~\nstatus: true\n"));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].message.contains("'label'"));
    }

    #[test]
    fn test_unregistered_name_passes() {
        let messages = validator().validate("system.site", &yaml("name: My Site\n"));
        assert!(messages.is_empty());
    }

    #[test]
    fn test_non_mapping_data_fails() {
        let messages = validator().validate("node.type.article", &Value::String("x".to_string()));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].message.contains("mapping"));
    }

    #[test]
    fn test_message_display() {
        let message = ValidationMessage {
            name: "node.type.article".to_string(),
            message: "the required key 'label' is missing".to_string(),
        };
        assert_eq!(
            message.to_string(),
            "node.type.article: the required key 'label' is missing"
        );
    }
}
