//! Extraction error types.

use thiserror::Error;

/// Extraction engine failures.
///
/// `NoTablesFound` is a legitimate terminal outcome of a well-formed
/// document, distinct from `UnparsableDocument` (the file could not be
/// read at all). Only `Transient` is retryable.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no tables found in document")]
    NoTablesFound,

    #[error("document could not be read: {0}")]
    UnparsableDocument(String),

    #[error("transient extraction failure: {0}")]
    Transient(String),
}

impl ExtractError {
    /// The matching job-failure kind.
    pub fn kind(&self) -> sheetpress_core::ErrorKind {
        match self {
            Self::NoTablesFound => sheetpress_core::ErrorKind::NoTablesFound,
            Self::UnparsableDocument(_) => sheetpress_core::ErrorKind::UnparsableDocument,
            Self::Transient(_) => sheetpress_core::ErrorKind::Transient,
        }
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;
