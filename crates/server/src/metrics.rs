//! Prometheus metrics for the Sheetpress server.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no per-owner data, but they do expose aggregate usage.
//! Restrict the endpoint to authorized scraper IPs at the infrastructure
//! level; do not expose it on public networks.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Job lifecycle metrics
pub static JOBS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetpress_jobs_created_total",
        "Total number of conversion jobs created by the upload handshake",
    )
    .expect("metric creation failed")
});

pub static JOBS_ADMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetpress_jobs_admitted_total",
        "Total number of jobs admitted past the quota gate",
    )
    .expect("metric creation failed")
});

pub static JOBS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetpress_jobs_completed_total",
        "Total number of jobs completed with a stored workbook",
    )
    .expect("metric creation failed")
});

pub static JOBS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sheetpress_jobs_failed_total",
            "Total number of terminally failed jobs by error kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static JOB_RETRIES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetpress_job_retries_total",
        "Total number of transient failures returned to the queue",
    )
    .expect("metric creation failed")
});

pub static JOBS_SWEPT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetpress_jobs_swept_total",
        "Total number of stuck processing jobs requeued by the sweep",
    )
    .expect("metric creation failed")
});

// Quota metrics
pub static QUOTA_DENIALS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetpress_quota_denials_total",
        "Total number of admissions denied by the quota ledger",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static EXTRACTION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "sheetpress_extraction_duration_seconds",
            "Time taken to run one extraction attempt",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        let registry = &*REGISTRY;
        registry
            .register(Box::new(JOBS_CREATED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(JOBS_ADMITTED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(JOBS_COMPLETED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(JOBS_FAILED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(JOB_RETRIES.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(JOBS_SWEPT.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(QUOTA_DENIALS.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(EXTRACTION_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics".to_string(),
        );
    }
    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!(error = %e, "Metrics encoding produced invalid UTF-8");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to encode metrics".to_string(),
            )
        }
    }
}
