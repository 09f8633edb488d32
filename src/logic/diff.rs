use crate::logic::validate::ValidatedChanges;
use crate::model::{Entity, EntitySchema, StagePlan, StagedWrite};

/// Compare validated changes against the entity's current (merged) values.
///
/// Only attributes whose proposed value differs end up in the plan, in
/// schema attribute order, so the result does not depend on the order the
/// proposal listed its fields in.
pub fn diff(schema: &EntitySchema, current: &Entity, changes: &ValidatedChanges) -> StagePlan {
    assert!(
        schema.kind == current.kind,
        "diffing a {} against the {} schema",
        current.kind,
        schema.kind
    );

    let mut plan = StagePlan::new(current);
    for attr in schema.attributes {
        let Some(proposed) = changes.get(attr.name) else {
            continue;
        };
        let existing = current.get(attr.name);
        if proposed != existing {
            plan.writes.push(StagedWrite {
                attribute: attr.name.to_string(),
                old_value: existing.clone(),
                new_value: proposed.clone(),
            });
        }
    }
    plan
}
