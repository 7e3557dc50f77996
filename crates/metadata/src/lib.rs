//! Durable record store for Sheetpress.
//!
//! One row per conversion job, one per quota record; nothing else is durable
//! in this core. All job state transitions go through compare-and-swap
//! updates keyed on the expected current status, so concurrent workers and
//! request handlers can never double-apply a transition.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{JobRow, QuotaRow};
pub use repos::{JobRepo, QuotaRepo};
pub use store::{JobStore, SqliteStore};

use sheetpress_core::config::MetadataConfig;
use std::sync::Arc;

/// Construct a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn JobStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store))
        }
    }
}
