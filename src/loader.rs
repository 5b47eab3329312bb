use std::collections::HashMap;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio_postgres::types::ToSql;

use crate::db::Database;
use crate::error::EtlError;
use crate::record::{Record, Value};
use crate::transform::TransformedChunk;

/// The loader's contract, as a trait so the orchestrator can be driven
/// against a fake in tests without a real database. `Loader` below is the
/// `tokio-postgres`-backed implementation the binary actually uses.
#[async_trait]
pub trait ChunkLoader: Send + Sync {
    async fn processed_chunks(&self, run_id: &str) -> Result<Vec<i64>, EtlError>;
    async fn load_chunk(&self, run_id: &str, chunk: &TransformedChunk) -> Result<(), EtlError>;
}

/// Lets an `Arc<L>` stand in for `L` wherever a `ChunkLoader` is expected,
/// so tests can keep a handle to a fake loader after handing one to the
/// orchestrator.
#[async_trait]
impl<T: ChunkLoader + ?Sized> ChunkLoader for std::sync::Arc<T> {
    async fn processed_chunks(&self, run_id: &str) -> Result<Vec<i64>, EtlError> {
        (**self).processed_chunks(run_id).await
    }

    async fn load_chunk(&self, run_id: &str, chunk: &TransformedChunk) -> Result<(), EtlError> {
        (**self).load_chunk(run_id, chunk).await
    }
}

/// How many rows go into one multi-value `INSERT` statement. PostgreSQL caps
/// bind parameters at 65535; this keeps us far under that regardless of
/// column count.
const BATCH_PAGE_SIZE: usize = 1000;

/// One non-key column of a `TargetTable`: its name and the Postgres type it
/// is declared with in DDL. The declared type must agree with whatever
/// `Value` variant the loader actually binds for that column -- `Value`'s
/// `ToSql` impl (`src/record.rs`) serializes using the value's own wire
/// encoding (float8, timestamptz, ...), not the column's declared type, so a
/// mismatch here surfaces as a runtime encoding error or corrupted data.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// Describes the application-defined target table: its name, the column
/// used as the upsert key, and the remaining columns to write. The loader's
/// core logic never hard-codes a schema -- this descriptor is how callers
/// supply one.
#[derive(Debug, Clone)]
pub struct TargetTable {
    pub table: String,
    pub key_column: String,
    pub columns: Vec<Column>,
}

impl TargetTable {
    /// The illustrative target table: `orders`, keyed by `external_id`.
    /// Column types follow the `Value` variant the Normalize/Enrich steps
    /// actually produce for each field (float8 for `amount`, timestamptz
    /// for `created_at`), matching SPEC_FULL's reference schema and the
    /// teacher's own typed-column convention (`open REAL`, `created_at
    /// TIMESTAMP WITH TIME ZONE` in `create_ohlcv_table`).
    pub fn orders_default() -> Self {
        Self {
            table: "orders".to_string(),
            key_column: "external_id".to_string(),
            columns: vec![
                Column::new("amount", "DOUBLE PRECISION"),
                Column::new("country_code", "TEXT"),
                Column::new("country_name", "TEXT"),
                Column::new("created_at", "TIMESTAMPTZ"),
            ],
        }
    }

    fn create_table_sql(&self) -> String {
        let mut cols = format!("{} TEXT PRIMARY KEY", self.key_column);
        for c in &self.columns {
            cols.push_str(&format!(", {} {}", c.name, c.sql_type));
        }
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.table, cols)
    }
}

/// Loads one `TransformedChunk` into the target table inside a single
/// transaction, updating the `etl_chunks` ledger as it goes. See
/// `load_chunk` for the transactional protocol.
pub struct Loader {
    db: Database,
    target: TargetTable,
}

impl Loader {
    pub fn new(db: Database, target: TargetTable) -> Self {
        Self { db, target }
    }

    /// Idempotently provisions the ledger table and (for the default
    /// descriptor) the reference target table. Call once before the main
    /// loop; a missing/unreachable schema is a setup error, not a load error.
    pub async fn ensure_schema(&self) -> Result<(), EtlError> {
        self.db
            .execute(
                "CREATE TABLE IF NOT EXISTS etl_chunks (
                    run_id TEXT NOT NULL,
                    chunk_id BIGINT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('processing', 'success', 'failed')),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    PRIMARY KEY (run_id, chunk_id)
                )",
                &[],
            )
            .await?;

        self.db.execute(&self.target.create_table_sql(), &[]).await?;
        Ok(())
    }

}

#[async_trait]
impl ChunkLoader for Loader {
    /// Returns the set of `chunk_id`s already `success` for this run.
    async fn processed_chunks(&self, run_id: &str) -> Result<Vec<i64>, EtlError> {
        let rows = self
            .db
            .query(
                "SELECT chunk_id FROM etl_chunks WHERE run_id = $1 AND status = 'success'",
                &[&run_id],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.get(0)).collect())
    }

    /// Loads one chunk. Empty chunks (every record quarantined) return `Ok`
    /// without touching the database -- an all-quarantined chunk has no data
    /// work to do, and its ledger row (if any) is left as-is.
    async fn load_chunk(&self, run_id: &str, chunk: &TransformedChunk) -> Result<(), EtlError> {
        if chunk.records.is_empty() {
            return Ok(());
        }

        let chunk_id = chunk.chunk_id as i64;

        match self.try_load(run_id, chunk_id, &chunk.records).await {
            Ok(()) => {
                info!(
                    "chunk {} (run {}) loaded: {} records",
                    chunk_id,
                    run_id,
                    chunk.records.len()
                );
                Ok(())
            }
            Err(e) => {
                warn!("chunk {} (run {}) load failed: {}", chunk_id, run_id, e);
                if let Err(mark_err) = self.mark_failed(run_id, chunk_id).await {
                    error!(
                        "chunk {} (run {}) failed to record failure in ledger: {}",
                        chunk_id, run_id, mark_err
                    );
                }
                Err(EtlError::Load(e.to_string()))
            }
        }
    }
}

impl Loader {
    async fn try_load(&self, run_id: &str, chunk_id: i64, records: &[Record]) -> Result<(), EtlError> {
        let mut client = self.db.client().await?;
        let tx = client.transaction().await?;

        tx.execute(
            "INSERT INTO etl_chunks (run_id, chunk_id, status)
             VALUES ($1, $2, 'processing')
             ON CONFLICT (run_id, chunk_id) DO UPDATE SET status = 'processing'",
            &[&run_id, &chunk_id],
        )
        .await?;

        let deduped = dedupe_by_key(records, &self.target.key_column);

        for page in deduped.chunks(BATCH_PAGE_SIZE) {
            self.upsert_page(&tx, page).await?;
        }

        tx.execute(
            "UPDATE etl_chunks SET status = 'success', updated_at = now()
             WHERE run_id = $1 AND chunk_id = $2",
            &[&run_id, &chunk_id],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Marks the ledger row `failed` in its own, separately committed
    /// transaction -- the data transaction above has already been rolled
    /// back (implicitly, by `Transaction`'s `Drop`), so this re-acquires a
    /// fresh client rather than trusting the old one's transaction state.
    async fn mark_failed(&self, run_id: &str, chunk_id: i64) -> Result<(), EtlError> {
        self.db
            .execute(
                "UPDATE etl_chunks SET status = 'failed', updated_at = now()
                 WHERE run_id = $1 AND chunk_id = $2",
                &[&run_id, &chunk_id],
            )
            .await?;
        Ok(())
    }

    async fn upsert_page(
        &self,
        tx: &deadpool_postgres::Transaction<'_>,
        page: &[&Record],
    ) -> Result<(), EtlError> {
        if page.is_empty() {
            return Ok(());
        }

        let width = 1 + self.target.columns.len();
        let column_names: Vec<&str> = self.target.columns.iter().map(|c| c.name.as_str()).collect();
        let mut query = format!(
            "INSERT INTO {} ({}, {}) VALUES ",
            self.target.table,
            self.target.key_column,
            column_names.join(", ")
        );

        let mut value_groups = Vec::with_capacity(page.len());
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(page.len() * width);

        for (i, record) in page.iter().enumerate() {
            let base = i * width;
            let placeholders: Vec<String> =
                (1..=width).map(|j| format!("${}", base + j)).collect();
            value_groups.push(format!("({})", placeholders.join(", ")));

            params.push(record_field(record, &self.target.key_column));
            for col in &self.target.columns {
                params.push(record_field(record, &col.name));
            }
        }

        query.push_str(&value_groups.join(", "));
        query.push_str(&format!(" ON CONFLICT ({}) DO UPDATE SET ", self.target.key_column));
        query.push_str(
            &self
                .target
                .columns
                .iter()
                .map(|c| format!("{} = EXCLUDED.{}", c.name, c.name))
                .collect::<Vec<_>>()
                .join(", "),
        );

        tx.execute(&query, &params).await?;
        Ok(())
    }
}

fn record_field<'a>(record: &'a Record, name: &str) -> &'a (dyn ToSql + Sync) {
    static ABSENT: Value = Value::Absent;
    record.get(name).unwrap_or(&ABSENT)
}

/// Stringifies a key-column value for dedup comparison. Any present value
/// coerces to a key, not just `Text` -- a JSON-lines source can hand the key
/// column a bare `Number`/`Bool`/`Timestamp` (see `Value::from` in
/// `record.rs`), and silently dropping those from the batch would violate
/// the loader's atomicity contract. Only a genuinely `Absent`/missing key
/// has nothing to dedup on.
fn key_string(record: &Record, key_column: &str) -> Option<String> {
    match record.get(key_column) {
        Some(Value::Text(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(Value::Timestamp(t)) => Some(t.to_rfc3339()),
        Some(Value::Absent) | None => None,
    }
}

/// Deduplicates by key column, keeping the last occurrence's value but the
/// first occurrence's position -- duplicate keys within one chunk are
/// delegated to this policy rather than the database's batch-upsert
/// semantics, so behavior is deterministic regardless of driver/server.
fn dedupe_by_key<'a>(records: &'a [Record], key_column: &str) -> Vec<&'a Record> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, &'a Record> = HashMap::new();

    for record in records {
        let key = match key_string(record, key_column) {
            Some(k) => k,
            None => continue,
        };
        if !by_key.contains_key(&key) {
            order.push(key.clone());
        }
        by_key.insert(key, record);
    }

    order.into_iter().map(|k| by_key[&k]).collect()
}
