//! Application state shared across handlers and workers.

use sheetpress_core::config::AppConfig;
use sheetpress_extract::TableExtractor;
use sheetpress_metadata::JobStore;
use sheetpress_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob store for inputs and results.
    pub storage: Arc<dyn ObjectStore>,
    /// Durable job and quota records.
    pub metadata: Arc<dyn JobStore>,
    /// Extraction engine used by the workers.
    pub extractor: Arc<dyn TableExtractor>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Panics
    ///
    /// Panics if configuration validation fails; the server must not come
    /// up with an invalid configuration.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn JobStore>,
        extractor: Arc<dyn TableExtractor>,
    ) -> Self {
        if let Err(error) = config.validate() {
            panic!("Invalid configuration: {error}");
        }

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            extractor,
        }
    }
}
