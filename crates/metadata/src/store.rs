//! Job store trait and the SQLite implementation.

use crate::error::MetadataResult;
use crate::models::{JobRow, QuotaRow};
use crate::repos::{JobRepo, QuotaRepo};
use async_trait::async_trait;
use sheetpress_core::{QuotaDecision, QuotaRolloverPolicy, Tier};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait JobStore: JobRepo + QuotaRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

const JOB_COLUMNS: &str = "job_id, owner_id, filename, status, source_key, result_key, \
     error_kind, error_detail, attempt_count, table_count, created_at, updated_at";

/// SQLite-based job store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // serializes writers, which also makes every repo method atomic
            // with respect to the others.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "SQLite job store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                job_id        BLOB PRIMARY KEY,
                owner_id      TEXT NOT NULL,
                filename      TEXT NOT NULL,
                status        TEXT NOT NULL,
                source_key    TEXT NOT NULL,
                result_key    TEXT,
                error_kind    TEXT,
                error_detail  TEXT,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                table_count   INTEGER,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_owner_created
             ON jobs(owner_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_status_updated
             ON jobs(status, updated_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS quotas (
                owner_id      TEXT PRIMARY KEY,
                tier          TEXT NOT NULL,
                used_count    INTEGER NOT NULL DEFAULT 0,
                period_anchor TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl JobRepo for SqliteStore {
    async fn create_job(&self, job: &JobRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO jobs (job_id, owner_id, filename, status, source_key, result_key,
                               error_kind, error_detail, attempt_count, table_count,
                               created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.job_id)
        .bind(&job.owner_id)
        .bind(&job.filename)
        .bind(&job.status)
        .bind(&job.source_key)
        .bind(&job.result_key)
        .bind(&job.error_kind)
        .bind(&job.error_detail)
        .bind(job.attempt_count)
        .bind(job.table_count)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<JobRow>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_jobs_for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> MetadataResult<Vec<JobRow>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE owner_id = ?
             ORDER BY created_at DESC, job_id DESC
             LIMIT ?"
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn admit_job(&self, job_id: Uuid, now: OffsetDateTime) -> MetadataResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', updated_at = ?
             WHERE job_id = ? AND status = 'pending_upload'",
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_next_queued(&self, now: OffsetDateTime) -> MetadataResult<Option<JobRow>> {
        // The subselect and update run as one statement, so concurrent
        // claimants can never obtain the same job.
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs
             SET status = 'processing', attempt_count = attempt_count + 1, updated_at = ?
             WHERE job_id = (
                 SELECT job_id FROM jobs WHERE status = 'queued'
                 ORDER BY updated_at ASC, created_at ASC LIMIT 1
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        result_key: &str,
        table_count: i32,
        now: OffsetDateTime,
    ) -> MetadataResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'completed', result_key = ?, table_count = ?, updated_at = ?
             WHERE job_id = ? AND status = 'processing'",
        )
        .bind(result_key)
        .bind(table_count)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        from: &str,
        error_kind: &str,
        error_detail: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'failed', error_kind = ?, error_detail = ?, updated_at = ?
             WHERE job_id = ? AND status = ?",
        )
        .bind(error_kind)
        .bind(error_detail)
        .bind(now)
        .bind(job_id)
        .bind(from)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn requeue_job(&self, job_id: Uuid, now: OffsetDateTime) -> MetadataResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', updated_at = ?
             WHERE job_id = ? AND status = 'processing'",
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_stuck_processing_jobs(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<JobRow>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE status = 'processing' AND updated_at < ?
             ORDER BY updated_at ASC
             LIMIT ?"
        ))
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_jobs_for_owner(&self, owner_id: &str) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl QuotaRepo for SqliteStore {
    async fn get_quota(&self, owner_id: &str) -> MetadataResult<Option<QuotaRow>> {
        let row = sqlx::query_as::<_, QuotaRow>(
            "SELECT owner_id, tier, used_count, period_anchor, updated_at
             FROM quotas WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn reserve_slot(
        &self,
        owner_id: &str,
        allotment: i64,
        policy: QuotaRolloverPolicy,
        now: OffsetDateTime,
    ) -> MetadataResult<QuotaDecision> {
        // Lazily create the record at the free tier.
        sqlx::query(
            "INSERT OR IGNORE INTO quotas (owner_id, tier, used_count, period_anchor, updated_at)
             VALUES (?, 'free', 0, ?, ?)",
        )
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let quota = sqlx::query_as::<_, QuotaRow>(
            "SELECT owner_id, tier, used_count, period_anchor, updated_at
             FROM quotas WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        if quota.tier == Tier::Paid.as_str() {
            return Ok(QuotaDecision::Allowed);
        }

        // Apply the rollover policy before the limit check. The anchor CAS
        // keeps two racing callers from resetting the window twice.
        if let Some(new_anchor) = policy.rollover_anchor(quota.period_anchor, now) {
            sqlx::query(
                "UPDATE quotas SET used_count = 0, period_anchor = ?, updated_at = ?
                 WHERE owner_id = ? AND period_anchor = ?",
            )
            .bind(new_anchor)
            .bind(now)
            .bind(owner_id)
            .bind(quota.period_anchor)
            .execute(&self.pool)
            .await?;
        }

        // The atomic check-and-increment: at the allotment boundary exactly
        // one of two racing reservations can match the WHERE clause.
        let result = sqlx::query(
            "UPDATE quotas SET used_count = used_count + 1, updated_at = ?
             WHERE owner_id = ? AND tier = 'free' AND used_count < ?",
        )
        .bind(now)
        .bind(owner_id)
        .bind(allotment)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(QuotaDecision::Allowed)
        } else {
            Ok(QuotaDecision::Denied)
        }
    }

    async fn release_slot(&self, owner_id: &str, now: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query(
            "UPDATE quotas SET used_count = MAX(used_count - 1, 0), updated_at = ?
             WHERE owner_id = ?",
        )
        .bind(now)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_tier(
        &self,
        owner_id: &str,
        tier: Tier,
        now: OffsetDateTime,
    ) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO quotas (owner_id, tier, used_count, period_anchor, updated_at)
             VALUES (?, ?, 0, ?, ?)
             ON CONFLICT(owner_id) DO UPDATE SET tier = excluded.tier, updated_at = excluded.updated_at",
        )
        .bind(owner_id)
        .bind(tier.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
