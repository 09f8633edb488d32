use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::model::{Entity, EntityKind, Id};

/// Typed projection of a zone entity (base or merged)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub starting_level: Option<i64>,
    pub ending_level: Option<i64>,
    pub graveyard_id: Option<Id>,
}

impl TryFrom<&Entity> for Zone {
    type Error = anyhow::Error;

    fn try_from(entity: &Entity) -> Result<Self> {
        if entity.kind != EntityKind::Zone {
            return Err(anyhow!("{} {} is not a zone", entity.kind, entity.id));
        }

        let text = |name: &str| -> Result<String> {
            entity
                .get(name)
                .as_text()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("zone {} has no {}", entity.id, name))
        };

        Ok(Zone {
            id: entity.id.clone(),
            name: text("name")?,
            description: text("description")?,
            starting_level: entity.get("starting_level").as_integer(),
            ending_level: entity.get("ending_level").as_integer(),
            graveyard_id: entity.get("graveyard_id").as_reference().cloned(),
        })
    }
}
