use anyhow::Result;

use crate::model::{EntityKind, Id, Page, PageRequest, Record, StagedChange};

/// Raised when the staged-change upsert fails for a reason other than the
/// key conflict it is written to absorb (e.g. a missing unique constraint).
#[derive(Debug, thiserror::Error)]
#[error("Upsert of staged change {entity_kind}/{record_id}.{attribute} failed: {reason}")]
pub struct UpsertConflict {
    pub entity_kind: EntityKind,
    pub record_id: Id,
    pub attribute: String,
    pub reason: String,
}

/// A base row together with its preloaded staged changes
pub type RecordWithChanges = (Record, Vec<StagedChange>);

/// Operations available inside one atomic unit of work.
///
/// Nothing is visible to other units of work until `commit`; dropping the unit
/// of work or calling `rollback` discards every write made through it.
#[async_trait::async_trait]
pub trait UnitOfWork: Send {
    async fn load_record(&mut self, kind: EntityKind, id: &Id) -> Result<Option<Record>>;
    /// Load a base row and hold a write lock on it until the unit of work
    /// ends. Writers of an entity's row or staged changes take this first.
    async fn lock_record(&mut self, kind: EntityKind, id: &Id) -> Result<Option<Record>>;
    async fn record_exists(&mut self, kind: EntityKind, id: &Id) -> Result<bool>;
    async fn insert_record(&mut self, record: &Record) -> Result<()>;
    async fn update_record(&mut self, record: &Record) -> Result<()>;

    /// Insert the change, or replace `value` and `updated_at` of the change
    /// already stored under the same `(entity_kind, record_id, attribute)`.
    async fn insert_or_replace(&mut self, change: &StagedChange) -> Result<()>;
    /// Staged changes of one entity, ordered by attribute
    async fn load_staged_changes(&mut self, kind: EntityKind, record_id: &Id)
        -> Result<Vec<StagedChange>>;
    /// Delete the given changes, skipping any row whose value was replaced
    /// since it was loaded (matched on `id` and `updated_at`)
    async fn delete_staged_changes(&mut self, changes: &[StagedChange]) -> Result<u64>;

    /// One page of base rows ordered by creation, each with its staged changes
    async fn paginate(
        &mut self,
        kind: EntityKind,
        request: PageRequest,
    ) -> Result<Page<RecordWithChanges>>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Read-only unit of work where every query sees the same snapshot
    async fn begin_read(&self) -> Result<Box<dyn UnitOfWork>> {
        self.begin().await
    }
}
