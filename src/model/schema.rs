use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AttributeType, AttributeValue, Entity, EntityKind, Record};

/// Definition of a single named, typed attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: &'static str,
    pub attr_type: AttributeType,
    pub required: bool,
    pub max_length: Option<usize>,
}

impl AttributeDef {
    const fn new(name: &'static str, attr_type: AttributeType) -> Self {
        Self {
            name,
            attr_type,
            required: false,
            max_length: None,
        }
    }

    const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    const fn max_length(self, max: usize) -> Self {
        Self {
            max_length: Some(max),
            ..self
        }
    }
}

/// Attribute set of one entity kind. The staging engine is parameterized over
/// this descriptor; attribute order here is the canonical order for diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub attributes: &'static [AttributeDef],
}

pub static ZONE_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Zone,
    attributes: &[
        AttributeDef::new("name", AttributeType::Text)
            .required()
            .max_length(255),
        AttributeDef::new("description", AttributeType::Text).required(),
        AttributeDef::new("starting_level", AttributeType::Integer),
        AttributeDef::new("ending_level", AttributeType::Integer),
        AttributeDef::new("graveyard_id", AttributeType::Reference(EntityKind::Room)),
    ],
};

pub static ROOM_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Room,
    attributes: &[
        AttributeDef::new("name", AttributeType::Text)
            .required()
            .max_length(255),
        AttributeDef::new("description", AttributeType::Text).required(),
        AttributeDef::new("zone_id", AttributeType::Reference(EntityKind::Zone)),
    ],
};

impl EntitySchema {
    pub fn for_kind(kind: EntityKind) -> &'static EntitySchema {
        match kind {
            EntityKind::Zone => &ZONE_SCHEMA,
            EntityKind::Room => &ROOM_SCHEMA,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Decode a persisted base row into a typed entity.
    ///
    /// Attributes missing from the stored map decode as null; keys the schema
    /// does not know are dropped.
    pub fn decode_record(&self, record: &Record) -> Result<Entity> {
        if record.kind != self.kind {
            return Err(anyhow!(
                "Record {} is a {} but was decoded as a {}",
                record.id,
                record.kind,
                self.kind
            ));
        }

        let mut attributes = BTreeMap::new();
        for attr in self.attributes {
            let value = match record.attributes.get(attr.name) {
                None => AttributeValue::Null,
                Some(stored) => attr.attr_type.decode(stored).ok_or_else(|| {
                    anyhow!(
                        "Stored value {} for {}.{} on {} is not a valid {}",
                        stored,
                        self.kind,
                        attr.name,
                        record.id,
                        attr.attr_type
                    )
                })?,
            };
            attributes.insert(attr.name.to_string(), value);
        }

        Ok(Entity {
            kind: record.kind,
            id: record.id.clone(),
            attributes,
            pending: BTreeSet::new(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}
