use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type Id = String;

/// Discriminator for the entity types that share the staging mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Zone,
    Room,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Zone => "zone",
            EntityKind::Room => "room",
        }
    }

    /// Plural path segment used by the HTTP layer
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Zone => "zones",
            EntityKind::Room => "rooms",
        }
    }

    pub fn all() -> [EntityKind; 2] {
        [EntityKind::Zone, EntityKind::Room]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zone" => Ok(EntityKind::Zone),
            "room" => Ok(EntityKind::Room),
            other => Err(anyhow::anyhow!("Unknown entity kind: {}", other)),
        }
    }
}

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trips_through_text() {
        for kind in [EntityKind::Zone, EntityKind::Room] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("graveyard".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_collection_names() {
        let collections: Vec<_> = EntityKind::all().iter().map(|k| k.collection()).collect();
        assert_eq!(collections, vec!["zones", "rooms"]);
    }
}
