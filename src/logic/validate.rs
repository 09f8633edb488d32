use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::model::{AttributeType, AttributeValue, Entity, EntitySchema};
use crate::store::traits::UnitOfWork;

/// Raw proposed field assignments, keyed by attribute name
pub type Proposal = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorType {
    Required,
    TypeMismatch,
    UnknownAttribute,
    TooLong,
    ReferenceNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub attribute: String,
    pub error_type: FieldErrorType,
    pub message: String,
}

impl FieldError {
    fn new(attribute: &str, error_type: FieldErrorType, message: impl Into<String>) -> Self {
        Self {
            attribute: attribute.to_string(),
            error_type,
            message: message.into(),
        }
    }
}

/// All field errors found in one proposal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, attribute: &str, error_type: FieldErrorType) -> bool {
        self.errors
            .iter()
            .any(|e| e.attribute == attribute && e.error_type == error_type)
    }

    fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{} {}", e.attribute, e.message))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Proposal after casting: every key is a schema attribute and every value
/// has the attribute's declared type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedChanges {
    pub changes: BTreeMap<String, AttributeValue>,
}

impl ValidatedChanges {
    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.changes.get(attribute)
    }
}

pub struct ChangesetValidator;

impl ChangesetValidator {
    /// Cast the proposal through the schema and check required attributes and
    /// lengths against the resulting values. `current` is the entity being
    /// edited, or `None` when the proposal creates a new one.
    pub fn cast(
        schema: &EntitySchema,
        current: Option<&Entity>,
        proposal: &Proposal,
    ) -> std::result::Result<ValidatedChanges, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let mut changes = BTreeMap::new();

        for (name, raw) in proposal {
            let Some(attr) = schema.attribute(name) else {
                errors.push(FieldError::new(
                    name,
                    FieldErrorType::UnknownAttribute,
                    format!("is not an attribute of {}", schema.kind),
                ));
                continue;
            };
            match attr.attr_type.cast(raw) {
                Some(value) => {
                    changes.insert(attr.name.to_string(), value);
                }
                None => errors.push(FieldError::new(
                    attr.name,
                    FieldErrorType::TypeMismatch,
                    format!("is invalid, expected {}", attr.attr_type),
                )),
            }
        }

        let null = AttributeValue::Null;
        for attr in schema.attributes {
            // Attributes that failed to cast are already reported
            if proposal.contains_key(attr.name) && !changes.contains_key(attr.name) {
                continue;
            }
            let resulting = match changes.get(attr.name) {
                Some(value) => value,
                None => match current {
                    Some(entity) => entity.get(attr.name),
                    None => &null,
                },
            };

            if attr.required && resulting.is_null() {
                errors.push(FieldError::new(
                    attr.name,
                    FieldErrorType::Required,
                    "can't be blank",
                ));
            }
            if let (Some(max), AttributeValue::Text(text)) = (attr.max_length, resulting) {
                if text.chars().count() > max {
                    errors.push(FieldError::new(
                        attr.name,
                        FieldErrorType::TooLong,
                        format!("should be at most {} character(s)", max),
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(ValidatedChanges { changes })
        } else {
            Err(errors)
        }
    }

    /// Check that every non-null reference in `values` points at an existing
    /// entity, using the caller's unit of work so the check sees the same
    /// snapshot as the writes that follow.
    pub async fn check_references(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        values: &BTreeMap<String, AttributeValue>,
    ) -> Result<ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let references: Vec<_> = values
            .iter()
            .filter_map(|(name, value)| {
                let attr = schema.attribute(name)?;
                match (attr.attr_type, value) {
                    (AttributeType::Reference(kind), AttributeValue::Reference(id)) => {
                        Some((attr.name, kind, id.clone()))
                    }
                    _ => None,
                }
            })
            .collect();

        for (name, kind, id) in references {
            if !uow.record_exists(kind, &id).await? {
                errors.push(FieldError::new(
                    name,
                    FieldErrorType::ReferenceNotFound,
                    format!("does not exist ({} {})", kind, id),
                ));
            }
        }
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, Record, ZONE_SCHEMA};
    use serde_json::json;

    fn proposal(value: serde_json::Value) -> Proposal {
        value.as_object().cloned().unwrap()
    }

    fn midgaard() -> Entity {
        let record = Record::new(
            EntityKind::Zone,
            "zone-1".to_string(),
            [
                ("name".to_string(), json!("Midgaard")),
                ("description".to_string(), json!("The city")),
            ]
            .into_iter()
            .collect(),
        );
        ZONE_SCHEMA.decode_record(&record).unwrap()
    }

    #[test]
    fn test_cast_partial_update_uses_current_values_for_required() {
        let zone = midgaard();
        let validated =
            ChangesetValidator::cast(&ZONE_SCHEMA, Some(&zone), &proposal(json!({"starting_level": "5"})))
                .unwrap();
        assert_eq!(
            validated.get("starting_level"),
            Some(&AttributeValue::Integer(5))
        );
        assert_eq!(validated.changes.len(), 1);
    }

    #[test]
    fn test_cast_collects_all_errors() {
        let zone = midgaard();
        let errors = ChangesetValidator::cast(
            &ZONE_SCHEMA,
            Some(&zone),
            &proposal(json!({
                "name": "",
                "ending_level": "high",
                "colour": "blue",
                "description": "x".repeat(10),
            })),
        )
        .unwrap_err();

        assert!(errors.has("name", FieldErrorType::Required));
        assert!(errors.has("ending_level", FieldErrorType::TypeMismatch));
        assert!(errors.has("colour", FieldErrorType::UnknownAttribute));
        assert_eq!(errors.errors.len(), 3);
    }

    #[test]
    fn test_create_requires_all_required_attributes() {
        let errors =
            ChangesetValidator::cast(&ZONE_SCHEMA, None, &proposal(json!({"name": "New"})))
                .unwrap_err();
        assert!(errors.has("description", FieldErrorType::Required));
        assert!(!errors.has("name", FieldErrorType::Required));
    }

    #[test]
    fn test_name_length_limit() {
        let zone = midgaard();
        let errors = ChangesetValidator::cast(
            &ZONE_SCHEMA,
            Some(&zone),
            &proposal(json!({"name": "n".repeat(256)})),
        )
        .unwrap_err();
        assert!(errors.has("name", FieldErrorType::TooLong));
        assert!(errors.to_string().starts_with("name should be at most 255"));
    }
}
