//! Background conversion workers and the supervising sweep.
//!
//! Extraction is long-running and must never block the request path: the
//! confirm handler only queues, and these tasks drain the queue. The job
//! table itself is the queue: `claim_next_queued` is an atomic CAS, so
//! any number of polling workers can share it without double-processing.

use crate::metrics::{
    EXTRACTION_DURATION, JOBS_COMPLETED, JOBS_FAILED, JOBS_SWEPT, JOB_RETRIES,
};
use crate::state::AppState;
use bytes::Bytes;
use sheetpress_core::job::result_key;
use sheetpress_core::{ErrorKind, JobId, JobStatus};
use sheetpress_extract::{write_workbook, ExtractError, ExtractResult};
use sheetpress_metadata::{JobRow, MetadataResult};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Batch size for sweep and recovery scans.
const SWEEP_BATCH: u32 = 100;

/// Handles for the spawned worker and sweep tasks.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the configured number of workers plus the supervising sweep.
    pub fn spawn(state: AppState) -> Self {
        let mut handles = Vec::new();
        for worker_id in 0..state.config.worker.concurrency {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                run_worker(worker_id, state).await;
            }));
        }

        let sweep_state = state.clone();
        handles.push(tokio::spawn(async move {
            run_sweep(sweep_state).await;
        }));

        tracing::info!(
            workers = state.config.worker.concurrency,
            "Conversion workers started"
        );
        Self { handles }
    }

    /// Abort all worker tasks. In-flight extraction finishes or is swept
    /// back into the queue on the next start.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

async fn run_worker(worker_id: u32, state: AppState) {
    loop {
        match process_one(&state).await {
            Ok(true) => {} // claimed and processed; look for more immediately
            Ok(false) => tokio::time::sleep(state.config.worker.poll_interval()).await,
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Worker failed to poll the queue");
                tokio::time::sleep(state.config.worker.poll_interval()).await;
            }
        }
    }
}

/// Claim and process at most one queued job. Returns whether a job was
/// claimed. Public so tests can drain the queue deterministically.
pub async fn process_one(state: &AppState) -> MetadataResult<bool> {
    let Some(job) = state
        .metadata
        .claim_next_queued(OffsetDateTime::now_utc())
        .await?
    else {
        return Ok(false);
    };
    process_job(state, job).await;
    Ok(true)
}

#[tracing::instrument(skip(state, job), fields(job_id = %job.job_id, attempt = job.attempt_count))]
async fn process_job(state: &AppState, job: JobRow) {
    let timer = std::time::Instant::now();
    let outcome = run_extraction(state, &job).await;
    EXTRACTION_DURATION.observe(timer.elapsed().as_secs_f64());

    let now = OffsetDateTime::now_utc();
    match outcome {
        Ok((result_key, table_count)) => {
            match state
                .metadata
                .complete_job(job.job_id, &result_key, table_count, now)
                .await
            {
                Ok(true) => {
                    JOBS_COMPLETED.inc();
                    tracing::info!(tables = table_count, "Job completed");
                }
                Ok(false) => {
                    // The sweep decided we were stuck and took the job away.
                    // The result object is keyed per job, so a re-run simply
                    // overwrites it.
                    tracing::warn!("Lost the completion race; job was requeued or failed");
                }
                Err(e) => tracing::error!(error = %e, "Failed to record job completion"),
            }
        }
        Err(err) => handle_extraction_failure(state, &job, err, now).await,
    }
}

async fn handle_extraction_failure(
    state: &AppState,
    job: &JobRow,
    err: ExtractError,
    now: OffsetDateTime,
) {
    let kind = err.kind();

    if kind.is_retryable() && job.attempt_count < state.config.worker.max_attempts {
        match state.metadata.requeue_job(job.job_id, now).await {
            Ok(true) => {
                JOB_RETRIES.inc();
                tracing::warn!(error = %err, "Transient failure; job requeued");
            }
            Ok(false) => tracing::warn!("Lost the requeue race"),
            Err(e) => tracing::error!(error = %e, "Failed to requeue job"),
        }
        return;
    }

    let (final_kind, detail) = if kind.is_retryable() {
        (
            ErrorKind::RetriesExhausted,
            format!(
                "conversion failed after {} attempts; try again later",
                job.attempt_count
            ),
        )
    } else {
        (kind, user_detail(&err))
    };

    match state
        .metadata
        .fail_job(
            job.job_id,
            JobStatus::Processing.as_str(),
            final_kind.as_str(),
            &detail,
            now,
        )
        .await
    {
        Ok(true) => {
            JOBS_FAILED.with_label_values(&[final_kind.as_str()]).inc();
            tracing::warn!(kind = %final_kind, detail = %detail, "Job failed terminally");
        }
        Ok(false) => tracing::warn!("Lost the failure race"),
        Err(e) => tracing::error!(error = %e, "Failed to record job failure"),
    }
}

/// The user-facing failure description. Document problems read as "this
/// file isn't convertible"; system problems suggest trying again later.
fn user_detail(err: &ExtractError) -> String {
    match err {
        ExtractError::NoTablesFound => {
            "no tables were found in this document; it is not convertible to a spreadsheet"
                .to_string()
        }
        ExtractError::UnparsableDocument(detail) => {
            format!("this document could not be read ({detail}); it is not convertible")
        }
        ExtractError::Transient(detail) => detail.clone(),
    }
}

async fn run_extraction(state: &AppState, job: &JobRow) -> ExtractResult<(String, i32)> {
    let bytes = state.storage.get(&job.source_key).await.map_err(|e| {
        ExtractError::Transient(format!("failed to fetch source document: {e}"))
    })?;

    // Extraction is CPU-bound; keep it off the async worker thread.
    let extractor = state.extractor.clone();
    let report = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
        .await
        .map_err(|e| ExtractError::Transient(format!("extraction task failed: {e}")))??;

    for warning in &report.warnings {
        tracing::debug!(job_id = %job.job_id, warning = %warning, "Extraction warning");
    }
    if report.tables.is_empty() {
        return Err(ExtractError::NoTablesFound);
    }

    let workbook = write_workbook(&report.tables)?;
    let key = result_key(&job.owner_id, JobId::from(job.job_id));
    state
        .storage
        .put(&key, Bytes::from(workbook))
        .await
        .map_err(|e| ExtractError::Transient(format!("failed to store result: {e}")))?;

    Ok((key, report.tables.len() as i32))
}

async fn run_sweep(state: AppState) {
    let mut interval = tokio::time::interval(state.config.worker.sweep_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = sweep_once(&state).await {
            tracing::error!(error = %e, "Supervising sweep failed");
        }
    }
}

/// One pass of the supervising sweep: jobs stuck in `processing` beyond
/// the configured ceiling are treated as transient casualties and returned
/// to the queue, subject to the attempt bound. Public so tests (and an
/// operator endpoint, if ever needed) can force a pass.
pub async fn sweep_once(state: &AppState) -> MetadataResult<u64> {
    let cutoff = OffsetDateTime::now_utc() - state.config.worker.processing_timeout();
    requeue_stuck_jobs(state, cutoff, "stuck in processing beyond the ceiling").await
}

/// Startup recovery: every `processing` row is an orphan of a previous
/// instance (no worker of this instance has started yet). Runs before the
/// workers spawn so orphans re-enter the queue immediately.
pub async fn recover_orphaned_jobs(state: &AppState) -> MetadataResult<u64> {
    let recovered =
        requeue_stuck_jobs(state, OffsetDateTime::now_utc(), "orphaned by a previous instance")
            .await?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "Recovered orphaned processing jobs");
    }
    Ok(recovered)
}

async fn requeue_stuck_jobs(
    state: &AppState,
    cutoff: OffsetDateTime,
    reason: &str,
) -> MetadataResult<u64> {
    let max_attempts = state.config.worker.max_attempts;
    let mut moved = 0u64;

    loop {
        let stuck = state
            .metadata
            .get_stuck_processing_jobs(cutoff, SWEEP_BATCH)
            .await?;
        if stuck.is_empty() {
            break;
        }

        for job in &stuck {
            let now = OffsetDateTime::now_utc();
            if job.attempt_count >= max_attempts {
                let detail = format!(
                    "conversion failed after {} attempts; try again later",
                    job.attempt_count
                );
                if state
                    .metadata
                    .fail_job(
                        job.job_id,
                        JobStatus::Processing.as_str(),
                        ErrorKind::RetriesExhausted.as_str(),
                        &detail,
                        now,
                    )
                    .await?
                {
                    JOBS_FAILED
                        .with_label_values(&[ErrorKind::RetriesExhausted.as_str()])
                        .inc();
                    moved += 1;
                    tracing::warn!(job_id = %job.job_id, reason, "Stuck job failed at attempt bound");
                }
            } else if state.metadata.requeue_job(job.job_id, now).await? {
                JOBS_SWEPT.inc();
                moved += 1;
                tracing::warn!(job_id = %job.job_id, reason, "Stuck job returned to the queue");
            }
        }

        if stuck.len() < SWEEP_BATCH as usize {
            break;
        }
    }

    Ok(moved)
}
