//! Local filesystem storage backend.
//!
//! Development and test backend. Presigned descriptors from this backend are
//! advisory `file://` URLs; nothing enforces their expiry, which is why this
//! backend must never face the public internet.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use sheetpress_core::PresignedRequest;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the full path for a key, with path traversal protection.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        // Reject keys with obvious traversal attempts (fast path)
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        // Every component must be a normal path segment (no .., ., root)
        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }

        Ok(self.root.join(key))
    }

    fn expiry_stamp(ttl: Duration) -> StorageResult<(String, i64)> {
        let expires = OffsetDateTime::now_utc()
            + time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        let formatted = expires
            .format(&Rfc3339)
            .map_err(|e| StorageError::Presign(format!("failed to format expiry: {e}")))?;
        Ok((formatted, expires.unix_timestamp()))
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a temp sibling then rename so readers never observe a
        // partially written object.
        let temp_path = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn issue_upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> StorageResult<PresignedRequest> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let (expires_at, expires_ts) = Self::expiry_stamp(ttl)?;
        Ok(PresignedRequest {
            url: format!("file://{}?expires={expires_ts}", path.display()),
            method: "PUT".to_string(),
            headers: vec![("content-type".to_string(), content_type.to_string())],
            expires_at,
        })
    }

    async fn issue_download_url(
        &self,
        key: &str,
        ttl: Duration,
    ) -> StorageResult<PresignedRequest> {
        let path = self.key_path(key)?;
        let (expires_at, expires_ts) = Self::expiry_stamp(ttl)?;
        Ok(PresignedRequest {
            url: format!("file://{}?expires={expires_ts}", path.display()),
            method: "GET".to_string(),
            headers: Vec::new(),
            expires_at,
        })
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        if fs::try_exists(&self.root).await? {
            Ok(())
        } else {
            Err(StorageError::Config(format!(
                "storage root missing: {}",
                self.root.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn backend() -> (tempfile::TempDir, FilesystemBackend) {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        (temp, backend)
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let (_temp, backend) = backend().await;
        backend
            .put("jobs/u1/j1/source.pdf", Bytes::from_static(b"pdf bytes"))
            .await
            .unwrap();

        assert!(backend.exists("jobs/u1/j1/source.pdf").await.unwrap());
        let data = backend.get("jobs/u1/j1/source.pdf").await.unwrap();
        assert_eq!(&data[..], b"pdf bytes");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_temp, backend) = backend().await;
        match backend.get("jobs/u1/missing").await {
            Err(StorageError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_temp, backend) = backend().await;
        backend.put("a/b", Bytes::from_static(b"x")).await.unwrap();
        backend.delete("a/b").await.unwrap();
        backend.delete("a/b").await.unwrap();
        assert!(!backend.exists("a/b").await.unwrap());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_temp, backend) = backend().await;
        for key in ["../escape", "/abs", "a/../../b", ""] {
            assert!(
                matches!(
                    backend.get(key).await,
                    Err(StorageError::InvalidKey(_))
                ),
                "key {key:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn upload_descriptor_carries_content_type_and_expiry() {
        let (_temp, backend) = backend().await;
        let req = backend
            .issue_upload_url("jobs/u1/j1/source.pdf", "application/pdf", Duration::from_secs(900))
            .await
            .unwrap();

        assert_eq!(req.method, "PUT");
        assert!(req.url.starts_with("file://"));
        assert!(req
            .headers
            .iter()
            .any(|(k, v)| k == "content-type" && v == "application/pdf"));
        assert!(!req.expires_at.is_empty());
    }
}
