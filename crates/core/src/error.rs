//! Error types and the job-failure taxonomy.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("invalid owner ID: {0}")]
    InvalidOwnerId(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("invalid job status: {0}")]
    InvalidStatus(String),

    #[error("invalid error kind: {0}")]
    InvalidErrorKind(String),

    #[error("invalid tier: {0}")]
    InvalidTier(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The failure taxonomy shared by the API surface, the job store, and the
/// extraction engine. Kinds are semantic categories, not representations;
/// each layer maps them onto its own error type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The uploaded content type is not an accepted document type.
    UnsupportedType,
    /// The caller does not own the referenced job.
    Forbidden,
    /// The job is not in a state that permits the requested operation.
    InvalidState,
    /// The owner's free allotment is exhausted.
    QuotaExceeded,
    /// Extraction ran to completion and found no tables anywhere.
    NoTablesFound,
    /// The document could not be read (corrupt, encrypted, unsupported).
    UnparsableDocument,
    /// A transient failure; the only retryable kind.
    Transient,
    /// Transient failures exhausted the attempt budget.
    RetriesExhausted,
    /// The job has no downloadable result yet.
    NotReady,
}

impl ErrorKind {
    /// Stable snake_case code used in persisted records and API bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedType => "unsupported_type",
            Self::Forbidden => "forbidden",
            Self::InvalidState => "invalid_state",
            Self::QuotaExceeded => "quota_exceeded",
            Self::NoTablesFound => "no_tables_found",
            Self::UnparsableDocument => "unparsable_document",
            Self::Transient => "transient",
            Self::RetriesExhausted => "retries_exhausted",
            Self::NotReady => "not_ready",
        }
    }

    /// Parse a persisted code back into a kind.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "unsupported_type" => Ok(Self::UnsupportedType),
            "forbidden" => Ok(Self::Forbidden),
            "invalid_state" => Ok(Self::InvalidState),
            "quota_exceeded" => Ok(Self::QuotaExceeded),
            "no_tables_found" => Ok(Self::NoTablesFound),
            "unparsable_document" => Ok(Self::UnparsableDocument),
            "transient" => Ok(Self::Transient),
            "retries_exhausted" => Ok(Self::RetriesExhausted),
            "not_ready" => Ok(Self::NotReady),
            other => Err(Error::InvalidErrorKind(other.to_string())),
        }
    }

    /// Only transient failures re-enter the queue; everything else is
    /// terminal on first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Whether the failure is a property of the submitted document rather
    /// than of the system. Document problems should tell the user the file
    /// is not convertible; system problems should suggest trying again.
    pub fn is_document_problem(&self) -> bool {
        matches!(self, Self::NoTablesFound | Self::UnparsableDocument)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
