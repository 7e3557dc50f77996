//! Conversion job identifiers, lifecycle states, and API payloads.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a conversion job.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidJobId(e.to_string()))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversion job lifecycle state.
///
/// `pending_upload → queued → processing → {completed | failed}`, with a
/// bounded `processing → queued` loop on transient extraction failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created by the upload handshake; waiting for the client to upload
    /// bytes to the blob store and confirm.
    PendingUpload,
    /// Admitted past the quota gate; waiting for a worker.
    Queued,
    /// Claimed by a worker; extraction in progress.
    Processing,
    /// Extraction succeeded; the result workbook is stored.
    Completed,
    /// Terminal failure; `error_kind`/`error_detail` describe why.
    Failed,
}

impl JobStatus {
    /// Stable snake_case code used in persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingUpload => "pending_upload",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a persisted code back into a status.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending_upload" => Ok(Self::PendingUpload),
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }

    /// Check if the job reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blob-store key for a job's uploaded source document.
pub fn source_key(owner_id: &str, job_id: JobId) -> String {
    format!("jobs/{owner_id}/{job_id}/source.pdf")
}

/// Blob-store key for a job's generated workbook.
pub fn result_key(owner_id: &str, job_id: JobId) -> String {
    format!("jobs/{owner_id}/{job_id}/result.xlsx")
}

/// Validate an owner identifier for use in records and object keys.
///
/// The identity provider is trusted to have authenticated the value, but it
/// still has to be safe to embed in keys and log lines.
pub fn validate_owner_id(owner_id: &str) -> Result<()> {
    if owner_id.is_empty() {
        return Err(Error::InvalidOwnerId("must not be empty".to_string()));
    }
    if owner_id.len() > crate::MAX_OWNER_ID_LEN {
        return Err(Error::InvalidOwnerId(format!(
            "exceeds {} characters",
            crate::MAX_OWNER_ID_LEN
        )));
    }
    if !owner_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | ':'))
    {
        return Err(Error::InvalidOwnerId(
            "contains characters outside [A-Za-z0-9-_.@:]".to_string(),
        ));
    }
    Ok(())
}

/// Validate and normalize a client-supplied content type.
///
/// Only the PDF media type is accepted; parameters (e.g. `;charset=...`)
/// are ignored.
pub fn validate_content_type(content_type: &str) -> Result<()> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if media_type == crate::PDF_CONTENT_TYPE {
        Ok(())
    } else {
        Err(Error::UnsupportedType(content_type.to_string()))
    }
}

/// Sanitize a client-supplied display filename.
///
/// Path separators and control characters are stripped; the result is
/// capped at [`crate::MAX_FILENAME_LEN`] characters. An empty result is an
/// error rather than a silent default.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let cleaned: String = filename
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\'))
        .take(crate::MAX_FILENAME_LEN)
        .collect();
    if cleaned.trim().is_empty() {
        return Err(Error::InvalidFilename(
            "empty after sanitization".to_string(),
        ));
    }
    Ok(cleaned)
}

/// A presigned request descriptor for direct client access to the blob
/// store. Raw file bytes only ever cross the client boundary through these;
/// the service never proxies them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresignedRequest {
    /// Target URL.
    pub url: String,
    /// HTTP method the client must use.
    pub method: String,
    /// Headers the client must send verbatim.
    pub headers: Vec<(String, String)>,
    /// Expiry timestamp (RFC 3339). Enforced by the blob store.
    pub expires_at: String,
}

/// Request body for the upload handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateJobRequest {
    /// Display filename of the document being uploaded.
    pub filename: String,
    /// Media type of the upload; must be `application/pdf`.
    pub content_type: String,
}

/// Response from the upload handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateJobResponse {
    /// The new job's ID.
    pub job_id: String,
    /// Always `pending_upload` at this point.
    pub status: JobStatus,
    /// Where and how to upload the document bytes.
    pub upload: PresignedRequest,
}

/// Response from confirming an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfirmJobResponse {
    pub job_id: String,
    /// `queued` on successful admission.
    pub status: JobStatus,
}

/// Client-facing view of a conversion job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
    /// Extraction attempts performed so far.
    pub attempt_count: i32,
    /// Worksheets in the result; present only once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_count: Option<i32>,
    /// Failure code; present only on failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Human-readable failure description; present only on failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// RFC 3339 timestamps.
    pub created_at: String,
    pub updated_at: String,
}

/// Response from requesting a result download.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub job_id: String,
    pub download: PresignedRequest,
}
