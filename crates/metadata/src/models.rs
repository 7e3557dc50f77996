//! Database models mapping to the metadata schema.

use sheetpress_core::{ErrorKind, JobStatus};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Conversion job record. Single source of truth for job state.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: Uuid,
    pub owner_id: String,
    /// Sanitized client-supplied display name.
    pub filename: String,
    pub status: String,
    /// Blob key of the uploaded PDF. Set once at creation, never mutated.
    pub source_key: String,
    /// Blob key of the generated workbook. Set only on completion, and only
    /// together with the status flip.
    pub result_key: Option<String>,
    pub error_kind: Option<String>,
    pub error_detail: Option<String>,
    /// Extraction attempts performed (incremented at claim time).
    pub attempt_count: i32,
    /// Worksheets in the result; set on completion.
    pub table_count: Option<i32>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl JobRow {
    /// Parse the persisted status string.
    pub fn job_status(&self) -> sheetpress_core::Result<JobStatus> {
        JobStatus::parse(&self.status)
    }

    /// Parse the persisted error kind, if any.
    pub fn job_error_kind(&self) -> Option<ErrorKind> {
        self.error_kind.as_deref().and_then(|k| ErrorKind::parse(k).ok())
    }
}

/// Per-owner quota record. Created lazily on first admission.
#[derive(Debug, Clone, FromRow)]
pub struct QuotaRow {
    pub owner_id: String,
    pub tier: String,
    /// Free conversions consumed in the current counting window.
    pub used_count: i64,
    /// Start of the current counting window.
    pub period_anchor: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl QuotaRow {
    /// Parse the persisted tier string.
    pub fn quota_tier(&self) -> sheetpress_core::Result<sheetpress_core::Tier> {
        sheetpress_core::Tier::parse(&self.tier)
    }
}
