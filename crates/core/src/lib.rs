//! Core domain types and shared logic for the Sheetpress conversion service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Conversion job identifiers, states, and API payloads
//! - The error-kind taxonomy shared between the engine, the store, and the API
//! - Quota tiers, admission decisions, and rollover policy
//! - The extracted table model
//! - Application configuration

pub mod config;
pub mod error;
pub mod job;
pub mod quota;
pub mod table;

pub use error::{Error, ErrorKind, Result};
pub use job::{JobId, JobStatus, PresignedRequest};
pub use quota::{QuotaDecision, QuotaRolloverPolicy, Tier};
pub use table::Table;

/// The only accepted upload media type.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Maximum accepted length for client-supplied filenames.
pub const MAX_FILENAME_LEN: usize = 255;

/// Maximum accepted length for owner identifiers.
pub const MAX_OWNER_ID_LEN: usize = 128;
