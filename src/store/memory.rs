use anyhow::{anyhow, Result};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::{EntityKind, Id, Page, PageRequest, Record, StagedChange};
use crate::store::traits::{RecordWithChanges, Store, UnitOfWork};

type RecordKey = (EntityKind, Id);
type ChangeKey = (EntityKind, Id, String);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    records: BTreeMap<RecordKey, Record>,
    staged: BTreeMap<ChangeKey, StagedChange>,
}

/// In-process store.
///
/// Units of work are serialized: `begin` takes the state lock and works on a
/// private copy that replaces the shared state on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of staged changes across all entities
    pub async fn staged_change_count(&self) -> usize {
        self.state.lock().await.staged.len()
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

#[async_trait::async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn load_record(&mut self, kind: EntityKind, id: &Id) -> Result<Option<Record>> {
        Ok(self.working.records.get(&(kind, id.clone())).cloned())
    }

    async fn lock_record(&mut self, kind: EntityKind, id: &Id) -> Result<Option<Record>> {
        // The whole state is already locked by this unit of work
        self.load_record(kind, id).await
    }

    async fn record_exists(&mut self, kind: EntityKind, id: &Id) -> Result<bool> {
        Ok(self.working.records.contains_key(&(kind, id.clone())))
    }

    async fn insert_record(&mut self, record: &Record) -> Result<()> {
        let key = (record.kind, record.id.clone());
        if self.working.records.contains_key(&key) {
            return Err(anyhow!("{} {} already exists", record.kind, record.id));
        }
        self.working.records.insert(key, record.clone());
        Ok(())
    }

    async fn update_record(&mut self, record: &Record) -> Result<()> {
        let existing = self
            .working
            .records
            .get_mut(&(record.kind, record.id.clone()))
            .ok_or_else(|| anyhow!("{} {} does not exist", record.kind, record.id))?;
        existing.attributes = record.attributes.clone();
        existing.updated_at = record.updated_at;
        Ok(())
    }

    async fn insert_or_replace(&mut self, change: &StagedChange) -> Result<()> {
        if !self
            .working
            .records
            .contains_key(&(change.entity_kind, change.record_id.clone()))
        {
            return Err(anyhow!(
                "Staged change references missing {} {}",
                change.entity_kind,
                change.record_id
            ));
        }

        let key = (
            change.entity_kind,
            change.record_id.clone(),
            change.attribute.clone(),
        );
        match self.working.staged.get_mut(&key) {
            Some(existing) => {
                existing.value = change.value.clone();
                existing.updated_at = change.updated_at;
            }
            None => {
                self.working.staged.insert(key, change.clone());
            }
        }
        Ok(())
    }

    async fn load_staged_changes(
        &mut self,
        kind: EntityKind,
        record_id: &Id,
    ) -> Result<Vec<StagedChange>> {
        Ok(self
            .working
            .staged
            .values()
            .filter(|c| c.entity_kind == kind && &c.record_id == record_id)
            .cloned()
            .collect())
    }

    async fn delete_staged_changes(&mut self, changes: &[StagedChange]) -> Result<u64> {
        let mut deleted = 0;
        for change in changes {
            let key = (
                change.entity_kind,
                change.record_id.clone(),
                change.attribute.clone(),
            );
            let unchanged = self
                .working
                .staged
                .get(&key)
                .is_some_and(|c| c.id == change.id && c.updated_at == change.updated_at);
            if unchanged {
                self.working.staged.remove(&key);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn paginate(
        &mut self,
        kind: EntityKind,
        request: PageRequest,
    ) -> Result<Page<RecordWithChanges>> {
        let records: Vec<&Record> = self
            .working
            .records
            .values()
            .filter(|r| r.kind == kind)
            .sorted_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .collect();
        let total = records.len() as u64;

        let mut changes_by_record = self
            .working
            .staged
            .values()
            .filter(|c| c.entity_kind == kind)
            .cloned()
            .into_group_map_by(|c| c.record_id.clone());

        let entries = records
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.page_size as usize)
            .map(|record| {
                let changes = changes_by_record.remove(&record.id).unwrap_or_default();
                (record.clone(), changes)
            })
            .collect();

        Ok(Page::new(entries, request, total))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
