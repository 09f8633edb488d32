use serde::Serialize;

use crate::model::{AttributeValue, Entity, EntityKind, Id, StagedChange};

/// A single attribute write produced by the diff
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedWrite {
    pub attribute: String,
    pub old_value: AttributeValue,
    pub new_value: AttributeValue,
}

/// Ordered list of staged-change upserts for one entity.
///
/// Built by the diff and executed by the staging coordinator inside a single
/// unit of work. Writes follow schema attribute order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePlan {
    pub entity_kind: EntityKind,
    pub record_id: Id,
    pub writes: Vec<StagedWrite>,
}

impl StagePlan {
    pub fn new(owner: &Entity) -> Self {
        Self {
            entity_kind: owner.kind,
            record_id: owner.id.clone(),
            writes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.writes.iter().map(|w| w.attribute.as_str())
    }

    /// Materialize the writes as staged changes owned by `owner`
    pub fn to_changes(&self, owner: &Entity) -> Vec<StagedChange> {
        assert!(
            owner.kind == self.entity_kind && owner.id == self.record_id,
            "stage plan for {} {} applied to {} {}",
            self.entity_kind,
            self.record_id,
            owner.kind,
            owner.id
        );
        self.writes
            .iter()
            .map(|w| StagedChange::create(owner, &w.attribute, &w.new_value))
            .collect()
    }
}
