//! Conversion job handlers: upload handshake, admission, status, download.

use crate::auth::Owner;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{JOBS_ADMITTED, JOBS_CREATED, QUOTA_DENIALS};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;
use sheetpress_core::job::{
    sanitize_filename, source_key, validate_content_type, ConfirmJobResponse, CreateJobRequest,
    CreateJobResponse, DownloadResponse, JobView,
};
use sheetpress_core::{ErrorKind, JobId, JobStatus, PDF_CONTENT_TYPE};
use sheetpress_metadata::JobRow;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// List response wrapper.
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobView>,
}

fn rfc3339(t: OffsetDateTime) -> ApiResult<String> {
    t.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
}

fn job_view(row: &JobRow) -> ApiResult<JobView> {
    let status = row
        .job_status()
        .map_err(|e| ApiError::Internal(format!("corrupt job status: {e}")))?;
    Ok(JobView {
        job_id: row.job_id.to_string(),
        filename: row.filename.clone(),
        status,
        attempt_count: row.attempt_count,
        table_count: row.table_count,
        error_kind: row.error_kind.clone(),
        error_detail: row.error_detail.clone(),
        created_at: rfc3339(row.created_at)?,
        updated_at: rfc3339(row.updated_at)?,
    })
}

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    JobId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Fetch a job and enforce ownership. Unknown job and foreign job are
/// deliberately distinct responses (404 vs 403); job IDs are unguessable
/// UUIDs, so the existence leak is acceptable and the 403 aids debugging.
async fn fetch_owned_job(state: &AppState, owner: &Owner, job_id: JobId) -> ApiResult<JobRow> {
    let row = state
        .metadata
        .get_job(*job_id.as_uuid())
        .await?
        .ok_or_else(|| ApiError::NotFound("job not found".to_string()))?;
    if row.owner_id != owner.as_str() {
        return Err(ApiError::Forbidden(
            "job belongs to a different user".to_string(),
        ));
    }
    Ok(row)
}

/// POST /v1/jobs - Upload handshake: create a pending job and issue a
/// presigned upload descriptor.
#[tracing::instrument(skip(state, body), fields(owner = %owner.as_str()))]
pub async fn create_job(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Json(body): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    // Validate everything before touching the store; a rejected request
    // must not leave a job record behind.
    validate_content_type(&body.content_type)?;
    let filename = sanitize_filename(&body.filename)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let job_id = JobId::new();
    let now = OffsetDateTime::now_utc();
    let source_key = source_key(owner.as_str(), job_id);

    let upload = state
        .storage
        .issue_upload_url(
            &source_key,
            PDF_CONTENT_TYPE,
            state.config.server.upload_url_ttl(),
        )
        .await?;

    let row = JobRow {
        job_id: *job_id.as_uuid(),
        owner_id: owner.as_str().to_string(),
        filename,
        status: JobStatus::PendingUpload.as_str().to_string(),
        source_key,
        result_key: None,
        error_kind: None,
        error_detail: None,
        attempt_count: 0,
        table_count: None,
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_job(&row).await?;

    JOBS_CREATED.inc();
    tracing::info!(job_id = %job_id, "Created conversion job");

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id: job_id.to_string(),
            status: JobStatus::PendingUpload,
            upload,
        }),
    ))
}

/// POST /v1/jobs/{job_id}/confirm - Admission: the client asserts the
/// upload completed; quota is checked and the job enters the queue.
///
/// Extraction never runs on this path; the caller gets an immediate
/// `queued` acknowledgment and polls for the terminal state.
#[tracing::instrument(skip(state), fields(owner = %owner.as_str(), job_id = %job_id))]
pub async fn confirm_job(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ConfirmJobResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let row = fetch_owned_job(&state, &owner, job_id).await?;

    // Confirming twice is rejected, not idempotently accepted; an
    // idempotent accept would double-bill the quota slot.
    if row.status != JobStatus::PendingUpload.as_str() {
        return Err(ApiError::InvalidState(format!(
            "job is {}, not pending_upload",
            row.status
        )));
    }

    // The client asserts the upload happened; verify before reserving a
    // quota slot so a premature confirm costs nothing.
    if !state.storage.exists(&row.source_key).await? {
        return Err(ApiError::BadRequest(
            "no uploaded document found for this job".to_string(),
        ));
    }

    let now = OffsetDateTime::now_utc();
    let decision = state
        .metadata
        .reserve_slot(
            owner.as_str(),
            state.config.quota.free_allotment,
            state.config.quota.rollover,
            now,
        )
        .await?;

    if !decision.is_allowed() {
        QUOTA_DENIALS.inc();
        // No reservation was made, so no slot is consumed by this failure.
        let applied = state
            .metadata
            .fail_job(
                *job_id.as_uuid(),
                JobStatus::PendingUpload.as_str(),
                ErrorKind::QuotaExceeded.as_str(),
                "free conversion allotment exhausted",
                now,
            )
            .await?;
        if !applied {
            tracing::warn!(job_id = %job_id, "Job left pending_upload during quota denial");
        }
        return Err(ApiError::QuotaExceeded(
            "free conversion allotment exhausted".to_string(),
        ));
    }

    // CAS into the queue; losing means a concurrent confirm won, so the
    // reserved slot goes back to keep the ledger exact.
    let admitted = state.metadata.admit_job(*job_id.as_uuid(), now).await?;
    if !admitted {
        state.metadata.release_slot(owner.as_str(), now).await?;
        return Err(ApiError::InvalidState(
            "job was confirmed concurrently".to_string(),
        ));
    }

    JOBS_ADMITTED.inc();
    tracing::info!(job_id = %job_id, "Job admitted to the conversion queue");

    Ok(Json(ConfirmJobResponse {
        job_id: job_id.to_string(),
        status: JobStatus::Queued,
    }))
}

/// GET /v1/jobs/{job_id} - Ownership-checked job view; the poll target.
#[tracing::instrument(skip(state), fields(owner = %owner.as_str(), job_id = %job_id))]
pub async fn get_job(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let job_id = parse_job_id(&job_id)?;
    let row = fetch_owned_job(&state, &owner, job_id).await?;
    Ok(Json(job_view(&row)?))
}

/// GET /v1/jobs - List the owner's jobs, newest first.
#[tracing::instrument(skip(state), fields(owner = %owner.as_str()))]
pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
) -> ApiResult<Json<ListJobsResponse>> {
    let rows = state
        .metadata
        .list_jobs_for_owner(owner.as_str(), state.config.server.max_list_jobs)
        .await?;
    let jobs = rows
        .iter()
        .map(job_view)
        .collect::<ApiResult<Vec<JobView>>>()?;
    Ok(Json(ListJobsResponse { jobs }))
}

/// GET /v1/jobs/{job_id}/download - Presigned download URL for the result
/// workbook. Valid only once the job completed.
#[tracing::instrument(skip(state), fields(owner = %owner.as_str(), job_id = %job_id))]
pub async fn get_download(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DownloadResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let row = fetch_owned_job(&state, &owner, job_id).await?;

    if row.status != JobStatus::Completed.as_str() {
        return Err(ApiError::NotReady(format!(
            "job is {}, no result to download",
            row.status
        )));
    }

    // Completed jobs always carry a result key; a missing one means the
    // terminal-exclusivity invariant was broken.
    let result_key = row.result_key.as_deref().ok_or_else(|| {
        ApiError::Internal("completed job has no result key".to_string())
    })?;

    let download = state
        .storage
        .issue_download_url(result_key, state.config.server.download_url_ttl())
        .await?;

    Ok(Json(DownloadResponse {
        job_id: job_id.to_string(),
        download,
    }))
}
