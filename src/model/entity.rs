use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AttributeValue, EntityKind, Id};

/// A committed base row as persisted by the store.
///
/// Attribute values are kept in their kind-erased JSON form; the entity's
/// schema is the authority for decoding them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub kind: EntityKind,
    pub id: Id,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(kind: EntityKind, id: Id, attributes: BTreeMap<String, serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            kind,
            id,
            attributes,
            created_at: now,
            updated_at: now,
        }
    }
}

static NULL: AttributeValue = AttributeValue::Null;

/// A decoded entity: either the base row itself or a merged view with
/// pending staged changes applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: Id,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Attributes whose value currently comes from a staged change
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub pending: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Value of `attribute`, null when the entity has no such attribute
    pub fn get(&self, attribute: &str) -> &AttributeValue {
        self.attributes.get(attribute).unwrap_or(&NULL)
    }

    pub fn is_staged(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Encode back into a persistable base row
    pub fn to_record(&self) -> Record {
        Record {
            kind: self.kind,
            id: self.id.clone(),
            attributes: self
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), value.encode()))
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ZONE_SCHEMA;
    use serde_json::json;

    #[test]
    fn test_record_round_trips_through_entity() {
        let record = Record::new(
            EntityKind::Zone,
            "zone-1".to_string(),
            [
                ("name".to_string(), json!("Midgaard")),
                ("description".to_string(), json!("City")),
                ("starting_level".to_string(), json!(1)),
                ("ending_level".to_string(), json!(null)),
                ("graveyard_id".to_string(), json!("room-3001")),
            ]
            .into_iter()
            .collect(),
        );

        let entity = ZONE_SCHEMA.decode_record(&record).unwrap();
        assert!(!entity.is_staged());
        assert_eq!(entity.to_record(), record);
    }

    #[test]
    fn test_get_unknown_attribute_is_null() {
        let record = Record::new(EntityKind::Room, "room-1".to_string(), BTreeMap::new());
        let entity = crate::model::ROOM_SCHEMA.decode_record(&record).unwrap();
        assert!(entity.get("no_such_field").is_null());
    }
}
