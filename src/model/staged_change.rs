use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, AttributeValue, Entity, EntityKind, Id};

/// One pending, uncommitted value for a single attribute of a single entity.
///
/// At most one staged change exists per `(entity_kind, record_id, attribute)`;
/// the store enforces this with a unique key and every write goes through its
/// insert-or-replace primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedChange {
    pub id: Id,
    pub entity_kind: EntityKind,
    pub record_id: Id,
    pub attribute: String,
    /// Kind-erased value, decoded through the owning entity's schema
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StagedChange {
    pub fn create(owner: &Entity, attribute: &str, value: &AttributeValue) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            entity_kind: owner.kind,
            record_id: owner.id.clone(),
            attribute: attribute.to_string(),
            value: value.encode(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn belongs_to(&self, entity: &Entity) -> bool {
        self.entity_kind == entity.kind && self.record_id == entity.id
    }
}
