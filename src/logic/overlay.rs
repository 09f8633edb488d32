use log::error;

use crate::model::{Entity, EntitySchema, Page, StagedChange};

/// Project pending staged changes onto a base entity.
///
/// Pure: the base entity and the changes are left untouched and a new merged
/// view is returned. Attributes without a staged change keep their base
/// value. Every change must belong to `entity`; anything else is a caller bug
/// and panics.
pub fn apply(schema: &EntitySchema, entity: &Entity, changes: &[StagedChange]) -> Entity {
    let mut merged = entity.clone();
    if changes.is_empty() {
        return merged;
    }

    for change in changes {
        assert!(
            change.belongs_to(entity),
            "staged change {} for {} {} applied to {} {}",
            change.id,
            change.entity_kind,
            change.record_id,
            entity.kind,
            entity.id
        );

        let Some(attr) = schema.attribute(&change.attribute) else {
            error!(
                "Ignoring staged change {} for unknown attribute {}.{}",
                change.id, schema.kind, change.attribute
            );
            continue;
        };
        match attr.attr_type.decode(&change.value) {
            Some(value) => {
                merged.attributes.insert(attr.name.to_string(), value);
                merged.pending.insert(attr.name.to_string());
            }
            None => error!(
                "Ignoring staged change {}: {} is not a valid {} for {}.{}",
                change.id, change.value, attr.attr_type, schema.kind, attr.name
            ),
        }
    }
    merged
}

/// Overlay every entry of a page independently, keeping order and metadata
pub fn apply_page(schema: &EntitySchema, page: Page<(Entity, Vec<StagedChange>)>) -> Page<Entity> {
    page.map(|(entity, changes)| apply(schema, &entity, &changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AttributeValue, EntityKind, PageRequest, Record, ROOM_SCHEMA, ZONE_SCHEMA,
    };
    use serde_json::json;

    fn zone(id: &str) -> Entity {
        let record = Record::new(
            EntityKind::Zone,
            id.to_string(),
            [
                ("name".to_string(), json!("Old")),
                ("description".to_string(), json!("D")),
            ]
            .into_iter()
            .collect(),
        );
        ZONE_SCHEMA.decode_record(&record).unwrap()
    }

    fn staged(owner: &Entity, attribute: &str, value: AttributeValue) -> StagedChange {
        StagedChange::create(owner, attribute, &value)
    }

    #[test]
    fn test_merge_replaces_only_staged_attributes() {
        let base = zone("zone-1");
        let changes = vec![staged(&base, "name", AttributeValue::Text("New".to_string()))];

        let merged = apply(&ZONE_SCHEMA, &base, &changes);

        assert_eq!(merged.get("name"), &AttributeValue::Text("New".to_string()));
        assert_eq!(merged.get("description"), &AttributeValue::Text("D".to_string()));
        assert!(merged.pending.contains("name"));
        // Base is untouched
        assert_eq!(base.get("name"), &AttributeValue::Text("Old".to_string()));
        assert!(!base.is_staged());
    }

    #[test]
    fn test_empty_changes_return_base() {
        let base = zone("zone-1");
        assert_eq!(apply(&ZONE_SCHEMA, &base, &[]), base);
    }

    #[test]
    fn test_overlay_is_idempotent() {
        let base = zone("zone-1");
        let changes = vec![
            staged(&base, "name", AttributeValue::Text("New".to_string())),
            staged(&base, "ending_level", AttributeValue::Integer(20)),
        ];

        let once = apply(&ZONE_SCHEMA, &base, &changes);
        assert_eq!(apply(&ZONE_SCHEMA, &once, &[]), once);
        assert_eq!(apply(&ZONE_SCHEMA, &once, &changes), once);
        assert_eq!(apply(&ZONE_SCHEMA, &base, &changes), once);
    }

    #[test]
    fn test_undecodable_value_keeps_base() {
        let base = zone("zone-1");
        let mut change = staged(&base, "starting_level", AttributeValue::Integer(3));
        change.value = json!("three");

        let merged = apply(&ZONE_SCHEMA, &base, &[change]);
        assert!(merged.get("starting_level").is_null());
        assert!(!merged.is_staged());
    }

    #[test]
    #[should_panic(expected = "applied to zone zone-1")]
    fn test_foreign_change_panics() {
        let base = zone("zone-1");
        let other = zone("zone-2");
        let change = staged(&other, "name", AttributeValue::Text("New".to_string()));
        apply(&ZONE_SCHEMA, &base, &[change]);
    }

    #[test]
    fn test_apply_page_is_per_entity() {
        let a = zone("zone-a");
        let b = zone("zone-b");
        let b_changes = vec![staged(&b, "name", AttributeValue::Text("B".to_string()))];
        let page = Page::new(
            vec![(a.clone(), Vec::new()), (b.clone(), b_changes)],
            PageRequest::new(4, 2),
            8,
        );

        let merged = apply_page(&ZONE_SCHEMA, page);
        assert_eq!(merged.page_number, 4);
        assert_eq!(merged.total_entries, 8);
        assert_eq!(merged.entries[0], a);
        assert_eq!(merged.entries[1].id, "zone-b");
        assert_eq!(merged.entries[1].get("name"), &AttributeValue::Text("B".to_string()));
    }

    #[test]
    fn test_room_schema_decodes_room_changes() {
        let record = Record::new(
            EntityKind::Room,
            "room-1".to_string(),
            [
                ("name".to_string(), json!("Temple")),
                ("description".to_string(), json!("Quiet")),
            ]
            .into_iter()
            .collect(),
        );
        let room = ROOM_SCHEMA.decode_record(&record).unwrap();
        let change = staged(&room, "zone_id", AttributeValue::Reference("zone-1".to_string()));

        let merged = apply(&ROOM_SCHEMA, &room, &[change]);
        assert_eq!(
            merged.get("zone_id"),
            &AttributeValue::Reference("zone-1".to_string())
        );
    }
}
