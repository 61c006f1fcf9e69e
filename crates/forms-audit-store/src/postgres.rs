//! Postgres backend for audit records, the consolidated cache and the event
//! queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forms_audit_core::config::DatabaseConfig;
use forms_audit_core::{
    AuditFilter, AuditRecord, AuditRecordInput, ConsolidatedAuditRecord, Pagination,
};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::audit::{AuditStore, AuditTransaction, ListResult};
use crate::cache::{CacheMetadata, CacheRow, CacheStore, METADATA_SORT_INDEX};
use crate::error::StoreError;
use crate::queue::{MessageQueue, QueueMessage, ReceiveOptions};

/// Schema statements, applied in order by [`PgStore::migrate`].
pub const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS audit_records (
        id BIGSERIAL PRIMARY KEY,
        message_id TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        category TEXT NOT NULL,
        event_type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        record_created_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL
    )"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS audit_records_message_id_idx ON audit_records (message_id)",
    "CREATE INDEX IF NOT EXISTS audit_records_entity_created_idx ON audit_records (entity_id, created_at DESC)",
    r#"CREATE TABLE IF NOT EXISTS consolidated_audit_cache (
        entity_id TEXT NOT NULL,
        sort_index INTEGER NOT NULL,
        total_items BIGINT,
        data JSONB,
        cached_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (entity_id, sort_index)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS audit_event_queue (
        id TEXT PRIMARY KEY,
        body TEXT NOT NULL,
        receipt_handle TEXT,
        receive_count INTEGER NOT NULL DEFAULT 0,
        visible_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    "CREATE INDEX IF NOT EXISTS audit_event_queue_visible_idx ON audit_event_queue (visible_at, enqueued_at)",
];

const INSERT_RECORD: &str = r#"
INSERT INTO audit_records
    (message_id, entity_id, category, event_type, created_at, record_created_at, document)
VALUES ($1, $2, $3, $4, $5, $6, $7)
RETURNING id
"#;

// LIMIT NULL means no limit.
const LIST_RECORDS: &str = r#"
SELECT id, document FROM audit_records
WHERE entity_id = $1 AND ($2::text IS NULL OR category = $2)
ORDER BY created_at DESC, id DESC
LIMIT $3 OFFSET $4
"#;

const COUNT_RECORDS: &str = r#"
SELECT COUNT(*) FROM audit_records
WHERE entity_id = $1 AND ($2::text IS NULL OR category = $2)
"#;

const RECEIVE_MESSAGES: &str = r#"
UPDATE audit_event_queue q
SET receipt_handle = gen_random_uuid()::text,
    receive_count = q.receive_count + 1,
    visible_at = now() + make_interval(secs => $1)
WHERE q.id IN (
    SELECT id FROM audit_event_queue
    WHERE visible_at <= now()
    ORDER BY enqueued_at
    LIMIT $2
    FOR UPDATE SKIP LOCKED
)
RETURNING q.id, q.body, q.receipt_handle
"#;

/// Metadata row insert; doubles as the per-entity population lock.
const CLAIM_METADATA: &str = r#"
INSERT INTO consolidated_audit_cache (entity_id, sort_index, total_items, data, cached_at)
VALUES ($1, $2, $3, NULL, $4)
ON CONFLICT (entity_id, sort_index) DO NOTHING
"#;

/// Rows per cache insert statement.
const CACHE_INSERT_CHUNK: usize = 500;

/// Interval between polls while a receive waits for messages.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Postgres-backed store. One pool serves all three traits.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect using the pool settings from `config`.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;

        tracing::info!(max_connections = config.max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in MIGRATIONS {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        tracing::info!(statements = MIGRATIONS.len(), "Applied schema migrations");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_record(row: &PgRow) -> Result<AuditRecord, StoreError> {
    let id: i64 = row.try_get("id")?;
    let Json(input): Json<AuditRecordInput> = row.try_get("document")?;
    Ok(AuditRecord::new(id.to_string(), input))
}

#[async_trait]
impl AuditStore for PgStore {
    async fn list(
        &self,
        filter: &AuditFilter,
        pagination: Option<Pagination>,
    ) -> Result<ListResult, StoreError> {
        let category = filter.category.map(|c| c.as_str());
        let (limit, offset) = match pagination {
            Some(p) => (Some(p.limit() as i64), p.skip() as i64),
            None => (None, 0),
        };

        let fetch = sqlx::query(LIST_RECORDS)
            .bind(&filter.entity_id)
            .bind(category)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool);

        let count = async {
            match pagination {
                Some(_) => sqlx::query_scalar::<_, i64>(COUNT_RECORDS)
                    .bind(&filter.entity_id)
                    .bind(category)
                    .fetch_one(&self.pool)
                    .await
                    .map(|n| Some(n.max(0) as u64)),
                None => Ok(None),
            }
        };

        let (rows, total_items) = tokio::try_join!(fetch, count)?;
        let documents = rows
            .iter()
            .map(decode_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListResult {
            documents,
            total_items,
        })
    }

    async fn begin(&self) -> Result<Box<dyn AuditTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgAuditTransaction { tx }))
    }
}

/// A Postgres transaction. Dropping it without committing rolls back.
pub struct PgAuditTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AuditTransaction for PgAuditTransaction {
    async fn insert(&mut self, record: &AuditRecordInput) -> Result<String, StoreError> {
        let document = serde_json::to_value(record)?;

        let id: i64 = sqlx::query_scalar(INSERT_RECORD)
            .bind(&record.message_id)
            .bind(record.entity_id())
            .bind(record.message.category.as_str())
            .bind(record.message.event_type.as_str())
            .bind(record.message.created_at)
            .bind(record.record_created_at)
            .bind(Json(document))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_insert(e, &record.message_id))?;

        Ok(id.to_string())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn claim_metadata(metadata: &CacheMetadata) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(CLAIM_METADATA)
        .bind(&metadata.entity_id)
        .bind(METADATA_SORT_INDEX)
        .bind(metadata.total_items as i64)
        .bind(metadata.cached_at)
}

async fn write_cache_rows(
    tx: &mut Transaction<'static, Postgres>,
    rows: &[CacheRow],
) -> Result<(), StoreError> {
    for chunk in rows.chunks(CACHE_INSERT_CHUNK) {
        let values = chunk
            .iter()
            .map(|row| serde_json::to_value(&row.data).map(|data| (row, data)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO consolidated_audit_cache (entity_id, sort_index, total_items, data, cached_at) ",
        );
        builder.push_values(values, |mut b, (row, data)| {
            b.push_bind(row.entity_id.clone())
                .push_bind(row.sort_index)
                .push_bind(None::<i64>)
                .push_bind(Json(data))
                .push_bind(row.cached_at);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

#[async_trait]
impl CacheStore for PgStore {
    async fn metadata_exists(&self, entity_id: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM consolidated_audit_cache WHERE entity_id = $1 AND sort_index = $2)",
        )
        .bind(entity_id)
        .bind(METADATA_SORT_INDEX)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_metadata(&self, entity_id: &str) -> Result<Option<CacheMetadata>, StoreError> {
        let row = sqlx::query(
            "SELECT total_items, cached_at FROM consolidated_audit_cache WHERE entity_id = $1 AND sort_index = $2",
        )
        .bind(entity_id)
        .bind(METADATA_SORT_INDEX)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<CacheMetadata, StoreError> {
            let total_items: Option<i64> = row.try_get("total_items")?;
            let cached_at: DateTime<Utc> = row.try_get("cached_at")?;
            Ok(CacheMetadata {
                entity_id: entity_id.to_string(),
                total_items: total_items.unwrap_or(0).max(0) as u64,
                cached_at,
            })
        })
        .transpose()
    }

    async fn insert_metadata_if_absent(
        &self,
        metadata: &CacheMetadata,
    ) -> Result<bool, StoreError> {
        let result = claim_metadata(metadata).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_rows(&self, rows: &[CacheRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        write_cache_rows(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(())
    }

    // A racing claim blocks on the uncommitted metadata row and then finds
    // it present, so readers never see metadata without its rows.
    async fn populate(
        &self,
        metadata: &CacheMetadata,
        rows: &[CacheRow],
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let claimed = claim_metadata(metadata).execute(&mut *tx).await?;
        if claimed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        write_cache_rows(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn read_rows(
        &self,
        entity_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ConsolidatedAuditRecord>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT data FROM consolidated_audit_cache
               WHERE entity_id = $1 AND sort_index >= 0
               ORDER BY sort_index
               LIMIT $2 OFFSET $3"#,
        )
        .bind(entity_id)
        .bind(limit as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ConsolidatedAuditRecord, StoreError> {
                let Json(data): Json<ConsolidatedAuditRecord> = row.try_get("data")?;
                Ok(data)
            })
            .collect()
    }

    async fn delete_entity(&self, entity_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM consolidated_audit_cache WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MessageQueue for PgStore {
    async fn receive(&self, options: ReceiveOptions) -> Result<Vec<QueueMessage>, StoreError> {
        let deadline = Instant::now() + options.wait_time;

        loop {
            let rows = sqlx::query(RECEIVE_MESSAGES)
                .bind(options.visibility_timeout.as_secs_f64())
                .bind(options.max_messages as i64)
                .fetch_all(&self.pool)
                .await?;

            if !rows.is_empty() {
                return rows
                    .iter()
                    .map(|row| -> Result<QueueMessage, StoreError> {
                        Ok(QueueMessage {
                            id: row.try_get("id")?,
                            body: row.try_get("body")?,
                            receipt_handle: row.try_get("receipt_handle")?,
                        })
                    })
                    .collect();
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(QUEUE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn delete(&self, id: &str, receipt_handle: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query("DELETE FROM audit_event_queue WHERE id = $1 AND receipt_handle = $2")
                .bind(id)
                .bind(receipt_handle)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM audit_event_queue WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?;
            if exists {
                return Err(StoreError::StaleReceipt {
                    message_id: id.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO audit_event_queue (id, body) VALUES ($1, $2)")
            .bind(&id)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_is_unique() {
        assert!(MIGRATIONS.iter().any(|m| m.contains("UNIQUE INDEX")
            && m.contains("audit_records (message_id)")));
    }

    #[test]
    fn test_cache_rows_keyed_by_entity_and_position() {
        let cache_table = MIGRATIONS
            .iter()
            .find(|m| m.contains("consolidated_audit_cache ("))
            .unwrap();
        assert!(cache_table.contains("PRIMARY KEY (entity_id, sort_index)"));
    }

    #[test]
    fn test_list_query_orders_newest_first() {
        assert!(LIST_RECORDS.contains("ORDER BY created_at DESC"));
        assert!(RECEIVE_MESSAGES.contains("SKIP LOCKED"));
    }

    #[test]
    fn test_metadata_claim_never_overwrites() {
        assert!(CLAIM_METADATA.contains("ON CONFLICT (entity_id, sort_index) DO NOTHING"));
        assert!(CLAIM_METADATA.contains("NULL"));
    }
}
