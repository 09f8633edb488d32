use anyhow::Result;
use log::info;
use serde_json::json;

use crate::logic::{Proposal, StagingCoordinator};
use crate::model::{Entity, Zone, ROOM_SCHEMA, ZONE_SCHEMA};
use crate::store::traits::Store;

fn proposal(value: serde_json::Value) -> Proposal {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Proposal::new(),
    }
}

/// Sample zone with its graveyard room
pub async fn load_seed_data<S: Store + ?Sized>(store: &S) -> Result<(Zone, Entity)> {
    let graveyard = StagingCoordinator::create(
        store,
        &ROOM_SCHEMA,
        &proposal(json!({
            "name": "Forgotten Graveyard",
            "description": "Crooked headstones lean out of the fog."
        })),
    )
    .await?;

    let zone = StagingCoordinator::create(
        store,
        &ZONE_SCHEMA,
        &proposal(json!({
            "name": "Misty Vale",
            "description": "A quiet valley at the edge of the map.",
            "starting_level": 1,
            "ending_level": 10,
            "graveyard_id": graveyard.id
        })),
    )
    .await?;

    // Move the room into the new zone; promotion is left to the operator
    StagingCoordinator::stage_update(
        store,
        &ROOM_SCHEMA,
        &graveyard.id,
        &proposal(json!({ "zone_id": zone.id })),
    )
    .await?;

    let zone = Zone::try_from(&zone)?;
    info!(
        "Seeded zone {} ({}, levels {:?}-{:?}) with graveyard {}",
        zone.id, zone.name, zone.starting_level, zone.ending_level, graveyard.id
    );
    Ok((zone, graveyard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeValue;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_seed_stages_room_move() {
        let store = MemoryStore::new();
        let (zone, graveyard) = load_seed_data(&store).await.unwrap();

        assert_eq!(zone.name, "Misty Vale");
        assert_eq!(zone.starting_level, Some(1));
        assert_eq!(zone.graveyard_id.as_ref(), Some(&graveyard.id));
        let room = StagingCoordinator::get(&store, &ROOM_SCHEMA, &graveyard.id)
            .await
            .unwrap();
        assert_eq!(room.get("zone_id"), &AttributeValue::Reference(zone.id.clone()));
        assert_eq!(store.staged_change_count().await, 1);
    }
}
