use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::error::StagingError;
use crate::logic::diff::diff;
use crate::logic::overlay::{apply, apply_page};
use crate::logic::validate::{ChangesetValidator, Proposal, ValidatedChanges};
use crate::model::{
    generate_id, AttributeValue, Entity, EntitySchema, Id, Page, PageRequest, Record, StagePlan,
    StagedChange,
};
use crate::store::traits::{Store, UnitOfWork};

pub type StagingResult<T> = Result<T, StagingError>;

/// Base entity, its pending changes, and the merged view of both
struct Loaded {
    base: Entity,
    changes: Vec<StagedChange>,
    merged: Entity,
}

/// Write and read paths for staged attribute changes.
///
/// Every operation runs inside one unit of work obtained from the store: it
/// commits when the operation succeeds and rolls back otherwise, so callers
/// never observe a partially staged edit.
pub struct StagingCoordinator;

impl StagingCoordinator {
    /// Stage `proposal` against entity `id` and return the merged view.
    ///
    /// The base row is never written. One staged change is upserted per
    /// attribute whose proposed value differs from the current merged value.
    pub async fn stage_update<S: Store + ?Sized>(
        store: &S,
        schema: &EntitySchema,
        id: &Id,
        proposal: &Proposal,
    ) -> StagingResult<Entity> {
        let mut uow = store.begin().await?;
        let result = Self::stage_in(uow.as_mut(), schema, id, proposal).await;
        let (plan, merged) = finish(uow, result).await?;

        info!(
            "Staged {} change(s) on {} {} ({} pending)",
            plan.len(),
            schema.kind,
            id,
            merged.pending.len()
        );
        Ok(merged)
    }

    /// Validate and diff `proposal` without writing anything
    pub async fn preview<S: Store + ?Sized>(
        store: &S,
        schema: &EntitySchema,
        id: &Id,
        proposal: &Proposal,
    ) -> StagingResult<StagePlan> {
        let mut uow = store.begin_read().await?;
        let result = match Self::load(uow.as_mut(), schema, id).await {
            Ok(loaded) => Self::plan(uow.as_mut(), schema, &loaded.merged, proposal).await,
            Err(err) => Err(err),
        };
        if let Err(err) = uow.rollback().await {
            warn!("Rollback after preview of {} {} failed: {}", schema.kind, id, err);
        }
        result
    }

    /// Merged view of one entity
    pub async fn get<S: Store + ?Sized>(
        store: &S,
        schema: &EntitySchema,
        id: &Id,
    ) -> StagingResult<Entity> {
        let mut uow = store.begin_read().await?;
        let result = Self::load(uow.as_mut(), schema, id).await;
        Ok(finish(uow, result).await?.merged)
    }

    /// The committed entity, ignoring pending changes
    pub async fn get_base<S: Store + ?Sized>(
        store: &S,
        schema: &EntitySchema,
        id: &Id,
    ) -> StagingResult<Entity> {
        let mut uow = store.begin_read().await?;
        let result = Self::load_base(uow.as_mut(), schema, id).await;
        finish(uow, result).await
    }

    /// One page of merged views, ordered by creation
    pub async fn list<S: Store + ?Sized>(
        store: &S,
        schema: &EntitySchema,
        request: PageRequest,
    ) -> StagingResult<Page<Entity>> {
        let mut uow = store.begin_read().await?;
        let result = Self::load_page(uow.as_mut(), schema, request).await;
        let page = finish(uow, result).await?;

        debug!(
            "Listed {} {}(s) on page {} ({} staged)",
            page.entries.len(),
            schema.kind,
            page.page_number,
            page.entries.iter().filter(|e| e.is_staged()).count()
        );
        Ok(page)
    }

    /// Pending changes of an existing entity, ordered by attribute
    pub async fn staged_changes<S: Store + ?Sized>(
        store: &S,
        schema: &EntitySchema,
        id: &Id,
    ) -> StagingResult<Vec<StagedChange>> {
        let mut uow = store.begin_read().await?;
        let result = Self::load(uow.as_mut(), schema, id).await;
        Ok(finish(uow, result).await?.changes)
    }

    /// Insert a new base entity directly; creation is not staged
    pub async fn create<S: Store + ?Sized>(
        store: &S,
        schema: &EntitySchema,
        proposal: &Proposal,
    ) -> StagingResult<Entity> {
        let mut uow = store.begin().await?;
        let result = Self::create_in(uow.as_mut(), schema, proposal).await;
        let created = finish(uow, result).await?;

        info!("Created {} {}", schema.kind, created.id);
        Ok(created)
    }

    /// Copy every pending change into the base row and clear them.
    ///
    /// The merged view is validated as a whole first. Changes that were
    /// replaced after being loaded are left pending.
    pub async fn promote<S: Store + ?Sized>(
        store: &S,
        schema: &EntitySchema,
        id: &Id,
    ) -> StagingResult<Entity> {
        let mut uow = store.begin().await?;
        let result = Self::promote_in(uow.as_mut(), schema, id).await;
        let (cleared, promoted) = finish(uow, result).await?;

        info!(
            "Promoted {} staged change(s) into {} {}",
            cleared, schema.kind, id
        );
        Ok(promoted)
    }

    /// Drop every pending change of an entity, leaving the base row as is
    pub async fn discard<S: Store + ?Sized>(
        store: &S,
        schema: &EntitySchema,
        id: &Id,
    ) -> StagingResult<u64> {
        let mut uow = store.begin().await?;
        let result = match Self::load_for_update(uow.as_mut(), schema, id).await {
            Ok(loaded) => uow
                .delete_staged_changes(&loaded.changes)
                .await
                .map_err(StagingError::from),
            Err(err) => Err(err),
        };
        let discarded = finish(uow, result).await?;

        info!("Discarded {} staged change(s) on {} {}", discarded, schema.kind, id);
        Ok(discarded)
    }

    async fn stage_in(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        id: &Id,
        proposal: &Proposal,
    ) -> StagingResult<(StagePlan, Entity)> {
        let loaded = Self::load_for_update(uow, schema, id).await?;
        let plan = Self::plan(uow, schema, &loaded.merged, proposal).await?;
        debug!(
            "Stage plan for {} {}: [{}]",
            schema.kind,
            id,
            plan.attributes().collect::<Vec<_>>().join(", ")
        );

        for change in plan.to_changes(&loaded.base) {
            uow.insert_or_replace(&change).await?;
        }

        // Reload everything: other attributes may have been staged earlier
        let changes = uow.load_staged_changes(schema.kind, id).await?;
        let merged = apply(schema, &loaded.base, &changes);
        Ok((plan, merged))
    }

    async fn plan(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        current: &Entity,
        proposal: &Proposal,
    ) -> StagingResult<StagePlan> {
        let validated = Self::validate(uow, schema, Some(current), proposal).await?;
        Ok(diff(schema, current, &validated))
    }

    async fn validate(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        current: Option<&Entity>,
        proposal: &Proposal,
    ) -> StagingResult<ValidatedChanges> {
        let validated = ChangesetValidator::cast(schema, current, proposal).map_err(|errors| {
            warn!("Rejected {} proposal: {}", schema.kind, errors);
            errors
        })?;

        let errors = ChangesetValidator::check_references(uow, schema, &validated.changes).await?;
        if !errors.is_empty() {
            warn!("Rejected {} proposal: {}", schema.kind, errors);
            return Err(errors.into());
        }
        Ok(validated)
    }

    async fn create_in(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        proposal: &Proposal,
    ) -> StagingResult<Entity> {
        let validated = Self::validate(uow, schema, None, proposal).await?;
        let attributes: BTreeMap<String, serde_json::Value> = schema
            .attributes
            .iter()
            .map(|attr| {
                let value = validated
                    .get(attr.name)
                    .cloned()
                    .unwrap_or(AttributeValue::Null);
                (attr.name.to_string(), value.encode())
            })
            .collect();

        let record = Record::new(schema.kind, generate_id(), attributes);
        uow.insert_record(&record).await?;
        Ok(schema.decode_record(&record)?)
    }

    async fn promote_in(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        id: &Id,
    ) -> StagingResult<(u64, Entity)> {
        let loaded = Self::load_for_update(uow, schema, id).await?;
        if loaded.changes.is_empty() {
            return Ok((0, loaded.base));
        }

        // Required attributes and references must hold for the merged view
        ChangesetValidator::cast(schema, Some(&loaded.merged), &Proposal::new())?;
        let errors =
            ChangesetValidator::check_references(uow, schema, &loaded.merged.attributes).await?;
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let mut record = loaded.merged.to_record();
        record.updated_at = Utc::now();
        uow.update_record(&record).await?;
        let cleared = uow.delete_staged_changes(&loaded.changes).await?;

        // Whatever is still pending was replaced concurrently and stays staged
        let remaining = uow.load_staged_changes(schema.kind, id).await?;
        let promoted = apply(schema, &schema.decode_record(&record)?, &remaining);
        Ok((cleared, promoted))
    }

    async fn load_base(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        id: &Id,
    ) -> StagingResult<Entity> {
        let record = uow
            .load_record(schema.kind, id)
            .await?
            .ok_or_else(|| StagingError::not_found(schema.kind, id))?;
        Ok(schema.decode_record(&record)?)
    }

    async fn load(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        id: &Id,
    ) -> StagingResult<Loaded> {
        let base = Self::load_base(uow, schema, id).await?;
        Self::overlay_pending(uow, schema, base).await
    }

    /// Like `load`, but holds the base row lock until the unit of work ends so
    /// no other writer can change the row or its staged changes meanwhile
    async fn load_for_update(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        id: &Id,
    ) -> StagingResult<Loaded> {
        let record = uow
            .lock_record(schema.kind, id)
            .await?
            .ok_or_else(|| StagingError::not_found(schema.kind, id))?;
        let base = schema.decode_record(&record)?;
        Self::overlay_pending(uow, schema, base).await
    }

    async fn overlay_pending(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        base: Entity,
    ) -> StagingResult<Loaded> {
        let changes = uow.load_staged_changes(schema.kind, &base.id).await?;
        let merged = apply(schema, &base, &changes);
        Ok(Loaded {
            base,
            changes,
            merged,
        })
    }

    async fn load_page(
        uow: &mut dyn UnitOfWork,
        schema: &EntitySchema,
        request: PageRequest,
    ) -> StagingResult<Page<Entity>> {
        let page = uow.paginate(schema.kind, request).await?;
        let mut decoded = Vec::with_capacity(page.entries.len());
        for (record, changes) in &page.entries {
            decoded.push((schema.decode_record(record)?, changes.clone()));
        }

        let page = Page {
            entries: decoded,
            page_number: page.page_number,
            page_size: page.page_size,
            total_entries: page.total_entries,
            total_pages: page.total_pages,
        };
        Ok(apply_page(schema, page))
    }
}

/// Commit on success, roll back on failure
async fn finish<T>(uow: Box<dyn UnitOfWork>, result: StagingResult<T>) -> StagingResult<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!("Rollback failed after {}: {}", err, rollback_err);
            }
            Err(err)
        }
    }
}
