//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use sheetpress_core::PresignedRequest;
use std::time::Duration;

/// Object store abstraction for job inputs and outputs.
///
/// Each job's keys are unique to that job, so no locking is needed at this
/// layer; the store is treated as an already-consistent key-value service.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Issue a presigned upload descriptor for direct client PUT of `key`.
    /// Expiry is enforced by the blob store, not by this service.
    async fn issue_upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> StorageResult<PresignedRequest>;

    /// Issue a presigned download descriptor for direct client GET of `key`.
    async fn issue_download_url(&self, key: &str, ttl: Duration)
        -> StorageResult<PresignedRequest>;

    /// Static identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during startup so the server never reports healthy while its
    /// storage is unreachable. The default implementation returns Ok(()),
    /// suitable for backends that need no connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
