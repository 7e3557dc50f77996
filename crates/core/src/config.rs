//! Configuration types shared across crates.

use crate::quota::QuotaRolloverPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Validity window for presigned upload URLs, in seconds.
    #[serde(default = "default_upload_url_ttl_secs")]
    pub upload_url_ttl_secs: u64,
    /// Validity window for presigned download URLs, in seconds.
    #[serde(default = "default_download_url_ttl_secs")]
    pub download_url_ttl_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// When enabled, restrict the endpoint to scraper IPs at the
    /// infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Maximum number of jobs returned by the list endpoint.
    #[serde(default = "default_max_list_jobs")]
    pub max_list_jobs: u32,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_upload_url_ttl_secs() -> u64 {
    900 // 15 minutes
}

fn default_download_url_ttl_secs() -> u64 {
    600 // 10 minutes
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_list_jobs() -> u32 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_url_ttl_secs: default_upload_url_ttl_secs(),
            download_url_ttl_secs: default_download_url_ttl_secs(),
            metrics_enabled: default_metrics_enabled(),
            max_list_jobs: default_max_list_jobs(),
        }
    }
}

impl ServerConfig {
    /// Upload URL TTL as a Duration.
    pub fn upload_url_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_url_ttl_secs)
    }

    /// Download URL TTL as a Duration.
    pub fn download_url_ttl(&self) -> Duration {
        Duration::from_secs(self.download_url_ttl_secs)
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage. Presigned URLs from this backend are
    /// advisory `file://` descriptors; development and tests only.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if
        /// not set. Prefer env vars or IAM roles over config files.
        access_key_id: Option<String>,
        /// AWS secret access key; same fallback rules.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO
        /// and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

/// Quota ledger configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Free-tier conversion allotment per counting window.
    #[serde(default = "default_free_allotment")]
    pub free_allotment: i64,
    /// When the free allotment resets.
    #[serde(default)]
    pub rollover: QuotaRolloverPolicy,
}

fn default_free_allotment() -> i64 {
    5
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_allotment: default_free_allotment(),
            rollover: QuotaRolloverPolicy::default(),
        }
    }
}

impl QuotaConfig {
    /// Validate quota configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.free_allotment < 0 {
            return Err(format!(
                "quota.free_allotment must be non-negative, got {}",
                self.free_allotment
            ));
        }
        Ok(())
    }
}

/// Extraction engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum mean cell-fill ratio for the structured pass to be trusted;
    /// below this the recognition fallback runs.
    #[serde(default = "default_min_fill_ratio")]
    pub min_fill_ratio: f64,
    /// Whether the optical-recognition fallback is available.
    #[serde(default = "default_ocr_enabled")]
    pub ocr_enabled: bool,
    /// Tesseract language codes (joined with '+').
    #[serde(default = "default_ocr_languages")]
    pub ocr_languages: Vec<String>,
    /// Rasterization DPI for the recognition pass.
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,
}

fn default_min_fill_ratio() -> f64 {
    0.30
}

fn default_ocr_enabled() -> bool {
    true
}

fn default_ocr_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_ocr_dpi() -> u32 {
    300
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_fill_ratio: default_min_fill_ratio(),
            ocr_enabled: default_ocr_enabled(),
            ocr_languages: default_ocr_languages(),
            ocr_dpi: default_ocr_dpi(),
        }
    }
}

impl ExtractionConfig {
    /// Validate extraction configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_fill_ratio) {
            return Err(format!(
                "worker.extraction.min_fill_ratio must be in [0,1], got {}",
                self.min_fill_ratio
            ));
        }
        if self.ocr_dpi == 0 {
            return Err("worker.extraction.ocr_dpi must be positive".to_string());
        }
        Ok(())
    }
}

/// Worker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent extraction workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Maximum extraction attempts per job before retries_exhausted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    /// Idle poll interval when the queue is empty, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wall-clock ceiling for a single processing attempt; jobs stuck
    /// longer are swept back into the queue.
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    /// How often the supervising sweep runs, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Extraction engine settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

fn default_concurrency() -> u32 {
    2
}

fn default_max_attempts() -> i32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_processing_timeout_secs() -> u64 {
    300 // 5 minutes
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            processing_timeout_secs: default_processing_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Validate worker configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("worker.concurrency must be positive".to_string());
        }
        if self.max_attempts < 1 {
            return Err(format!(
                "worker.max_attempts must be at least 1, got {}",
                self.max_attempts
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err("worker.poll_interval_ms must be positive".to_string());
        }
        self.extraction.validate()
    }

    /// Idle poll interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Processing ceiling as a Duration.
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    /// Sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Billing collaborator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Pre-computed SHA-256 hash (hex) of the webhook shared secret.
    /// Generate with: `echo -n "your-secret" | sha256sum`
    pub webhook_secret_hash: String,
}

impl BillingConfig {
    /// Create a test configuration with a deterministic secret hash.
    ///
    /// **For testing only.** The hash is SHA-256 of "test-billing-secret".
    pub fn for_testing() -> Self {
        Self {
            webhook_secret_hash:
                "9de77b855173f56fe471067ea0b84c49bde419ddee42adb0ed4a7b8397853374".to_string(),
        }
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Validate the whole configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.quota.validate()?;
        self.worker.validate()
    }

    /// Create a test configuration with temp-friendly defaults and the
    /// recognition fallback disabled (no Tesseract in CI).
    pub fn for_testing() -> Self {
        let mut worker = WorkerConfig::default();
        worker.extraction.ocr_enabled = false;
        worker.poll_interval_ms = 20;
        worker.sweep_interval_secs = 1;
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            quota: QuotaConfig::default(),
            worker,
            billing: BillingConfig::for_testing(),
        }
    }
}
