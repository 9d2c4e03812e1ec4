//! Processing ledger
//!
//! One row per distinct path ever observed. The ledger is append-only:
//! rows are never deleted and the classification columns (`is_clean`,
//! `noise_score`) are never rewritten. Both rules are enforced by SQLite
//! triggers in addition to this API offering no way to break them.
//!
//! `create` is the single concurrency-control point of the pipeline. It runs
//! one `INSERT ... ON CONFLICT(path) DO NOTHING`, so exactly one of any number
//! of concurrent callers for the same path observes `Created`.

use crate::models::{FileRecord, MetadataStatus, RepairStatus, StatusUpdate};
use crate::utils::retry_on_lock;
use chrono::{DateTime, Utc};
use nas_common::db::init_database;
use nas_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

/// Connections held by the ledger pool
const LEDGER_MAX_CONNECTIONS: u32 = 8;

/// Result of `Ledger::create`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Result of `Ledger::set_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

/// Dirty record as listed in the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirtyEntry {
    pub path: String,
    pub noise_score: f64,
    pub repair_status: RepairStatus,
}

/// Aggregate view of the ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub total: i64,
    pub clean: i64,
    pub dirty: i64,
    pub metadata_status: BTreeMap<String, i64>,
    pub repair_status: BTreeMap<String, i64>,
    pub dirty_files: Vec<DirtyEntry>,
}

/// Durable record store keyed by file path
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl Ledger {
    /// Open (or create) the ledger database at `db_path`
    pub async fn open(db_path: &Path, max_lock_wait_ms: u64) -> Result<Self> {
        let pool = init_database(db_path, LEDGER_MAX_CONNECTIONS).await?;
        Self::from_pool(pool, max_lock_wait_ms).await
    }

    /// Wrap an existing pool, creating the schema if missing
    pub async fn from_pool(pool: SqlitePool, max_lock_wait_ms: u64) -> Result<Self> {
        init_schema(&pool).await?;
        Ok(Self {
            pool,
            max_lock_wait_ms,
        })
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn is_known(&self, path: &str) -> Result<bool> {
        let pool = &self.pool;
        retry_on_lock("ledger.is_known", self.max_lock_wait_ms, || async move {
            let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM scans WHERE path = ?")
                .bind(path)
                .fetch_optional(pool)
                .await?;
            Ok(row.is_some())
        })
        .await
    }

    /// Insert a new record unless the path is already present.
    ///
    /// The score is clamped into [0,1]; NaN is stored as 1.0. Initial
    /// statuses follow the branch chosen by `is_clean`.
    pub async fn create(&self, path: &str, is_clean: bool, score: f64) -> Result<CreateOutcome> {
        let score = if score.is_nan() { 1.0 } else { score.clamp(0.0, 1.0) };
        let (metadata_status, repair_status) = FileRecord::initial_statuses(is_clean);
        let display_name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let scanned_at = Utc::now().to_rfc3339();

        let pool = &self.pool;
        let display_name = display_name.as_str();
        let scanned_at = scanned_at.as_str();

        let rows = retry_on_lock("ledger.create", self.max_lock_wait_ms, || async move {
            let result = sqlx::query(
                r#"
                INSERT INTO scans (path, display_name, is_clean, noise_score, scanned_at,
                                   metadata_status, repair_status)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(path) DO NOTHING
                "#,
            )
            .bind(path)
            .bind(display_name)
            .bind(is_clean)
            .bind(score)
            .bind(scanned_at)
            .bind(metadata_status.as_str())
            .bind(repair_status.as_str())
            .execute(pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if rows == 1 {
            Ok(CreateOutcome::Created)
        } else {
            Ok(CreateOutcome::AlreadyExists)
        }
    }

    /// Move one status column; the other columns are untouched
    pub async fn set_status(&self, path: &str, update: StatusUpdate) -> Result<UpdateOutcome> {
        let (sql, value) = match update {
            StatusUpdate::Metadata(status) => (
                "UPDATE scans SET metadata_status = ? WHERE path = ?",
                status.as_str(),
            ),
            StatusUpdate::Repair(status) => (
                "UPDATE scans SET repair_status = ? WHERE path = ?",
                status.as_str(),
            ),
        };

        let pool = &self.pool;
        let rows = retry_on_lock("ledger.set_status", self.max_lock_wait_ms, || async move {
            let result = sqlx::query(sql)
                .bind(value)
                .bind(path)
                .execute(pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if rows == 0 {
            Ok(UpdateOutcome::NotFound)
        } else {
            Ok(UpdateOutcome::Updated)
        }
    }

    pub async fn get(&self, path: &str) -> Result<Option<FileRecord>> {
        let pool = &self.pool;
        let row = retry_on_lock("ledger.get", self.max_lock_wait_ms, || async move {
            let row = sqlx::query(
                r#"
                SELECT path, display_name, is_clean, noise_score, scanned_at,
                       metadata_status, repair_status
                FROM scans
                WHERE path = ?
                "#,
            )
            .bind(path)
            .fetch_optional(pool)
            .await?;
            Ok(row)
        })
        .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    pub async fn count(&self) -> Result<i64> {
        let pool = &self.pool;
        retry_on_lock("ledger.count", self.max_lock_wait_ms, || async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scans")
                .fetch_one(pool)
                .await?;
            Ok(count)
        })
        .await
    }

    /// All records currently in the given metadata state, oldest first
    pub async fn records_with_metadata_status(
        &self,
        status: MetadataStatus,
    ) -> Result<Vec<FileRecord>> {
        let pool = &self.pool;
        let value = status.as_str();
        let rows = retry_on_lock("ledger.by_metadata_status", self.max_lock_wait_ms, || async move {
            let rows = sqlx::query(
                r#"
                SELECT path, display_name, is_clean, noise_score, scanned_at,
                       metadata_status, repair_status
                FROM scans
                WHERE metadata_status = ?
                ORDER BY id
                "#,
            )
            .bind(value)
            .fetch_all(pool)
            .await?;
            Ok(rows)
        })
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// All records currently in the given repair state, oldest first
    pub async fn records_with_repair_status(
        &self,
        status: RepairStatus,
    ) -> Result<Vec<FileRecord>> {
        let pool = &self.pool;
        let value = status.as_str();
        let rows = retry_on_lock("ledger.by_repair_status", self.max_lock_wait_ms, || async move {
            let rows = sqlx::query(
                r#"
                SELECT path, display_name, is_clean, noise_score, scanned_at,
                       metadata_status, repair_status
                FROM scans
                WHERE repair_status = ?
                ORDER BY id
                "#,
            )
            .bind(value)
            .fetch_all(pool)
            .await?;
            Ok(rows)
        })
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Totals, per-status counts and the dirty records with their scores
    pub async fn summary(&self) -> Result<LedgerSummary> {
        let pool = &self.pool;
        let (total, clean): (i64, i64) =
            retry_on_lock("ledger.summary", self.max_lock_wait_ms, || async move {
                let counts: (i64, Option<i64>) =
                    sqlx::query_as("SELECT COUNT(*), SUM(is_clean) FROM scans")
                        .fetch_one(pool)
                        .await?;
                Ok((counts.0, counts.1.unwrap_or(0)))
            })
            .await?;

        let metadata_status = self.status_counts("metadata_status").await?;
        let repair_status = self.status_counts("repair_status").await?;

        let dirty_rows = retry_on_lock("ledger.summary", self.max_lock_wait_ms, || async move {
            let rows = sqlx::query(
                r#"
                SELECT path, noise_score, repair_status
                FROM scans
                WHERE is_clean = 0
                ORDER BY noise_score DESC, id
                "#,
            )
            .fetch_all(pool)
            .await?;
            Ok(rows)
        })
        .await?;

        let dirty_files = dirty_rows
            .iter()
            .map(|row| {
                let repair: String = row.get("repair_status");
                Ok(DirtyEntry {
                    path: row.get("path"),
                    noise_score: row.get("noise_score"),
                    repair_status: parse_status(&repair)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LedgerSummary {
            total,
            clean,
            dirty: total - clean,
            metadata_status,
            repair_status,
            dirty_files,
        })
    }

    async fn status_counts(&self, column: &'static str) -> Result<BTreeMap<String, i64>> {
        let pool = &self.pool;
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM scans GROUP BY {column} ORDER BY {column}"
        );
        let sql = sql.as_str();
        let rows: Vec<(String, i64)> =
            retry_on_lock("ledger.status_counts", self.max_lock_wait_ms, || async move {
                let rows = sqlx::query_as::<_, (String, i64)>(sql)
                    .fetch_all(pool)
                    .await?;
                Ok(rows)
            })
            .await?;
        Ok(rows.into_iter().collect())
    }
}

/// Ledger key for a filesystem path.
///
/// Paths that are not valid UTF-8 have no key: a lossy conversion would map
/// distinct files onto the same record.
pub fn path_key(path: &Path) -> Option<&str> {
    path.to_str()
}

/// Create the `scans` table and its guard triggers (idempotent)
async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            is_clean INTEGER NOT NULL,
            noise_score REAL NOT NULL CHECK (noise_score >= 0.0 AND noise_score <= 1.0),
            scanned_at TEXT NOT NULL,
            metadata_status TEXT NOT NULL DEFAULT 'NONE',
            repair_status TEXT NOT NULL DEFAULT 'NONE'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS scans_classification_write_once
        BEFORE UPDATE OF is_clean, noise_score ON scans
        BEGIN
            SELECT RAISE(ABORT, 'is_clean and noise_score are write-once');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS scans_append_only
        BEFORE DELETE ON scans
        BEGIN
            SELECT RAISE(ABORT, 'ledger records are never deleted');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scans_metadata_status ON scans(metadata_status)")
        .execute(pool)
        .await?;

    tracing::debug!("Ledger schema initialized");
    Ok(())
}

fn parse_status<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = crate::models::UnknownStatus>,
{
    value
        .parse()
        .map_err(|e: crate::models::UnknownStatus| Error::Internal(e.to_string()))
}

fn record_from_row(row: &SqliteRow) -> Result<FileRecord> {
    let scanned_at: String = row.get("scanned_at");
    let scanned_at = DateTime::parse_from_rfc3339(&scanned_at)
        .map_err(|e| Error::Internal(format!("Bad scanned_at '{}': {}", scanned_at, e)))?
        .with_timezone(&Utc);
    let metadata: String = row.get("metadata_status");
    let repair: String = row.get("repair_status");

    Ok(FileRecord {
        path: row.get("path"),
        display_name: row.get("display_name"),
        is_clean: row.get("is_clean"),
        noise_score: row.get("noise_score"),
        scanned_at,
        metadata_status: parse_status(&metadata)?,
        repair_status: parse_status(&repair)?,
    })
}
