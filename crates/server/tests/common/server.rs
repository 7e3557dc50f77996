//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use sheetpress_core::config::{AppConfig, MetadataConfig, StorageConfig};
use sheetpress_extract::{Extractor, TableExtractor};
use sheetpress_metadata::{JobRow, JobStore, SqliteStore};
use sheetpress_server::{create_router, AppState};
use sheetpress_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// Header carrying the authenticated owner in tests.
pub const OWNER_HEADER: &str = "x-sheetpress-user";

/// Billing webhook secret matching `BillingConfig::for_testing()`.
pub const BILLING_SECRET: &str = "test-billing-secret";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with the real extraction engine (recognition
    /// fallback disabled) and temporary storage.
    pub async fn new() -> Self {
        Self::build(None, |_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(None, modifier).await
    }

    /// Create a test server with a scripted extraction engine.
    pub async fn with_extractor(extractor: Arc<dyn TableExtractor>) -> Self {
        Self::build(Some(extractor), |_| {}).await
    }

    async fn build<F>(extractor: Option<Arc<dyn TableExtractor>>, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn JobStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem { path: storage_path };
        config.metadata = MetadataConfig::Sqlite { path: db_path };
        modifier(&mut config);

        let extractor = extractor
            .unwrap_or_else(|| Arc::new(Extractor::from_config(&config.worker.extraction)));

        let state = AppState::new(config, storage, metadata, extractor);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata store.
    pub fn metadata(&self) -> Arc<dyn JobStore> {
        self.state.metadata.clone()
    }

    /// Fetch a job row directly from the store.
    pub async fn job_row(&self, job_id: &str) -> JobRow {
        let id = Uuid::parse_str(job_id).expect("invalid job id in test");
        self.state
            .metadata
            .get_job(id)
            .await
            .expect("failed to fetch job")
            .expect("job not found")
    }

    /// Simulate the client's direct-to-store upload for a job.
    pub async fn put_source(&self, job_id: &str, bytes: &[u8]) {
        let row = self.job_row(job_id).await;
        self.state
            .storage
            .put(&row.source_key, Bytes::copy_from_slice(bytes))
            .await
            .expect("failed to store source bytes");
    }
}

/// Make a JSON request against the router, optionally as an owner.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    owner: Option<&str>,
) -> (StatusCode, Value) {
    request_with_headers(router, method, uri, body, owner, &[]).await
}

/// Make a JSON request with extra headers.
#[allow(dead_code)]
pub async fn request_with_headers(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    owner: Option<&str>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(owner) = owner {
        builder = builder.header(OWNER_HEADER, owner);
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Run the full handshake for `owner`: create a job, upload `pdf`, and
/// confirm. Returns the job id and the confirm response.
#[allow(dead_code)]
pub async fn submit_job(
    server: &TestServer,
    owner: &str,
    pdf: &[u8],
) -> (String, StatusCode, Value) {
    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/jobs",
        Some(serde_json::json!({
            "filename": "report.pdf",
            "content_type": "application/pdf",
        })),
        Some(owner),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "handshake failed: {body}");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    server.put_source(&job_id, pdf).await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        &format!("/v1/jobs/{job_id}/confirm"),
        None,
        Some(owner),
    )
    .await;

    (job_id, status, body)
}
