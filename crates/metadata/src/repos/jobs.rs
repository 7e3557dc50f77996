//! Conversion job repository.

use crate::error::MetadataResult;
use crate::models::JobRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for conversion job records.
///
/// Every transition method is a single atomic compare-and-swap keyed on the
/// expected current status and returns whether the transition applied. A
/// `false` return means another writer got there first; callers must treat
/// it as losing the race, never as success.
#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Create a new job record (status `pending_upload`).
    async fn create_job(&self, job: &JobRow) -> MetadataResult<()>;

    /// Get a job by ID.
    async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<JobRow>>;

    /// List an owner's jobs, newest first.
    async fn list_jobs_for_owner(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> MetadataResult<Vec<JobRow>>;

    /// CAS `pending_upload → queued`.
    async fn admit_job(&self, job_id: Uuid, now: OffsetDateTime) -> MetadataResult<bool>;

    /// Atomically claim the oldest queued job for processing: CAS
    /// `queued → processing` and increment `attempt_count` in one statement.
    /// At most one caller obtains a given job. Returns the claimed row.
    async fn claim_next_queued(&self, now: OffsetDateTime) -> MetadataResult<Option<JobRow>>;

    /// CAS `processing → completed`, setting `result_key`, `table_count`,
    /// and the status together, never one without the other.
    async fn complete_job(
        &self,
        job_id: Uuid,
        result_key: &str,
        table_count: i32,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// CAS `<from> → failed`, recording the error kind and human-readable
    /// detail.
    async fn fail_job(
        &self,
        job_id: Uuid,
        from: &str,
        error_kind: &str,
        error_detail: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// CAS `processing → queued` (bounded transient retry).
    async fn requeue_job(&self, job_id: Uuid, now: OffsetDateTime) -> MetadataResult<bool>;

    /// Jobs stuck in `processing` whose last transition is older than
    /// `older_than`. Consumed by the supervising sweep.
    async fn get_stuck_processing_jobs(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<JobRow>>;

    /// Count an owner's jobs.
    async fn count_jobs_for_owner(&self, owner_id: &str) -> MetadataResult<u64>;
}
