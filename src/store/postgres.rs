use anyhow::{Context, Result};
use itertools::Itertools;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Postgres, Row, Transaction};
use std::collections::BTreeMap;

use crate::model::{EntityKind, Id, Page, PageRequest, Record, StagedChange};
use crate::store::traits::{RecordWithChanges, Store, UnitOfWork, UpsertConflict};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }
}

pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    async fn begin_read(&self) -> Result<Box<dyn UnitOfWork>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .context("Failed to set snapshot isolation")?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

fn record_from_row(row: &PgRow) -> Result<Record> {
    let kind: String = row.try_get("kind")?;
    let attributes: serde_json::Value = row.try_get("attributes")?;
    let attributes: BTreeMap<String, serde_json::Value> =
        serde_json::from_value(attributes).context("Failed to deserialize record attributes")?;

    Ok(Record {
        kind: kind.parse()?,
        id: row.try_get("id")?,
        attributes,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn staged_change_from_row(row: &PgRow) -> Result<StagedChange> {
    let entity_kind: String = row.try_get("entity_kind")?;

    Ok(StagedChange {
        id: row.try_get("id")?,
        entity_kind: entity_kind.parse()?,
        record_id: row.try_get("record_id")?,
        attribute: row.try_get("attribute")?,
        value: row.try_get("value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn attributes_json(record: &Record) -> Result<serde_json::Value> {
    serde_json::to_value(&record.attributes).context("Failed to serialize record attributes")
}

#[async_trait::async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn load_record(&mut self, kind: EntityKind, id: &Id) -> Result<Option<Record>> {
        let row = sqlx::query(
            "SELECT kind, id, attributes, created_at, updated_at FROM records WHERE kind = $1 AND id = $2",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch record")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn lock_record(&mut self, kind: EntityKind, id: &Id) -> Result<Option<Record>> {
        let row = sqlx::query(
            "SELECT kind, id, attributes, created_at, updated_at FROM records WHERE kind = $1 AND id = $2 FOR UPDATE",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to lock record")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn record_exists(&mut self, kind: EntityKind, id: &Id) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM records WHERE kind = $1 AND id = $2)",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to check record existence")?;

        Ok(exists)
    }

    async fn insert_record(&mut self, record: &Record) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO records (kind, id, attributes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.kind.as_str())
        .bind(&record.id)
        .bind(attributes_json(record)?)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .context("Failed to insert record")?;

        Ok(())
    }

    async fn update_record(&mut self, record: &Record) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET attributes = $3, updated_at = $4
            WHERE kind = $1 AND id = $2
            "#,
        )
        .bind(record.kind.as_str())
        .bind(&record.id)
        .bind(attributes_json(record)?)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .context("Failed to update record")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("{} {} does not exist", record.kind, record.id);
        }
        Ok(())
    }

    async fn insert_or_replace(&mut self, change: &StagedChange) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO staged_changes (id, entity_kind, record_id, attribute, value, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (entity_kind, record_id, attribute) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&change.id)
        .bind(change.entity_kind.as_str())
        .bind(&change.record_id)
        .bind(&change.attribute)
        .bind(&change.value)
        .bind(change.created_at)
        .bind(change.updated_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            // Constraint or definition errors reported by the server itself
            Err(sqlx::Error::Database(db_err)) => Err(UpsertConflict {
                entity_kind: change.entity_kind,
                record_id: change.record_id.clone(),
                attribute: change.attribute.clone(),
                reason: db_err.to_string(),
            }
            .into()),
            Err(e) => Err(e).context("Failed to upsert staged change"),
        }
    }

    async fn load_staged_changes(
        &mut self,
        kind: EntityKind,
        record_id: &Id,
    ) -> Result<Vec<StagedChange>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity_kind, record_id, attribute, value, created_at, updated_at
            FROM staged_changes
            WHERE entity_kind = $1 AND record_id = $2
            ORDER BY attribute
            "#,
        )
        .bind(kind.as_str())
        .bind(record_id)
        .fetch_all(&mut *self.tx)
        .await
        .context("Failed to load staged changes")?;

        rows.iter().map(staged_change_from_row).collect()
    }

    async fn delete_staged_changes(&mut self, changes: &[StagedChange]) -> Result<u64> {
        if changes.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Id> = changes.iter().map(|c| c.id.clone()).collect();
        let stamps: Vec<chrono::DateTime<chrono::Utc>> =
            changes.iter().map(|c| c.updated_at).collect();

        let result = sqlx::query(
            r#"
            DELETE FROM staged_changes s
            USING UNNEST($1::text[], $2::timestamptz[]) AS d(id, updated_at)
            WHERE s.id = d.id AND s.updated_at = d.updated_at
            "#,
        )
        .bind(&ids)
        .bind(&stamps)
        .execute(&mut *self.tx)
        .await
        .context("Failed to delete staged changes")?;

        Ok(result.rows_affected())
    }

    async fn paginate(
        &mut self,
        kind: EntityKind,
        request: PageRequest,
    ) -> Result<Page<RecordWithChanges>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE kind = $1")
            .bind(kind.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .context("Failed to count records")?;

        let rows = sqlx::query(
            r#"
            SELECT kind, id, attributes, created_at, updated_at
            FROM records
            WHERE kind = $1
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(kind.as_str())
        .bind(i64::from(request.page_size))
        .bind(request.offset() as i64)
        .fetch_all(&mut *self.tx)
        .await
        .context("Failed to list records")?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>>>()?;
        let ids: Vec<Id> = records.iter().map(|r| r.id.clone()).collect();

        let change_rows = sqlx::query(
            r#"
            SELECT id, entity_kind, record_id, attribute, value, created_at, updated_at
            FROM staged_changes
            WHERE entity_kind = $1 AND record_id = ANY($2)
            ORDER BY record_id, attribute
            "#,
        )
        .bind(kind.as_str())
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .context("Failed to preload staged changes")?;

        let mut changes_by_record = change_rows
            .iter()
            .map(staged_change_from_row)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .into_group_map_by(|c| c.record_id.clone());

        let entries = records
            .into_iter()
            .map(|record| {
                let changes = changes_by_record.remove(&record.id).unwrap_or_default();
                (record, changes)
            })
            .collect();

        Ok(Page::new(entries, request, total.max(0) as u64))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back transaction")
    }
}
