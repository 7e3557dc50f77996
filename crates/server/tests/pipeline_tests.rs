//! End-to-end pipeline tests: admission through extraction to terminal
//! states, exercising the retry and sweep machinery.

mod common;

use axum::http::StatusCode;
use calamine::{Reader, Xlsx};
use common::{
    encrypted_pdf, json_request, prose_pdf, submit_job, tabular_pdf, ScriptedExtractor,
    ScriptedOutcome, TestServer,
};
use sheetpress_server::worker::{process_one, recover_orphaned_jobs, sweep_once};
use std::io::Cursor;
use std::sync::Arc;
use time::OffsetDateTime;

/// Drain the queue until no job remains.
async fn drain_queue(server: &TestServer) {
    while process_one(&server.state).await.unwrap() {}
}

#[tokio::test]
async fn tabular_pdf_completes_and_roundtrips() {
    let server = TestServer::new().await;
    let (job_id, status, _) = submit_job(&server, "user-1", &tabular_pdf()).await;
    assert_eq!(status, StatusCode::OK);

    drain_queue(&server).await;

    let row = server.job_row(&job_id).await;
    assert_eq!(row.status, "completed");
    assert_eq!(row.attempt_count, 1);
    assert!(row.error_kind.is_none());
    assert!(row.error_detail.is_none());
    let result_key = row.result_key.expect("completed job must carry a result key");
    let table_count = row.table_count.expect("completed job must carry a table count");

    // The stored workbook parses back with exactly the reported number of
    // worksheets, and the cells survived the trip.
    let bytes = server.state.storage.get(&result_key).await.unwrap();
    let mut workbook = Xlsx::new(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(workbook.sheet_names().len(), table_count as usize);

    let range = workbook.worksheet_range("Page1-T1").unwrap();
    assert_eq!(range.get_value((0, 0)).unwrap().to_string(), "Item");
    assert_eq!(range.get_value((1, 2)).unwrap().to_string(), "9.50");

    // The download endpoint now serves a presigned descriptor.
    let (status, body) = json_request(
        &server.router,
        "GET",
        &format!("/v1/jobs/{job_id}/download"),
        None,
        Some("user-1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["download"]["url"]
        .as_str()
        .unwrap()
        .contains("result.xlsx"));
}

#[tokio::test]
async fn prose_pdf_fails_with_no_tables_found() {
    let server = TestServer::new().await;
    let (job_id, status, _) = submit_job(&server, "user-1", &prose_pdf()).await;
    assert_eq!(status, StatusCode::OK);

    drain_queue(&server).await;

    let row = server.job_row(&job_id).await;
    assert_eq!(row.status, "failed");
    assert_eq!(row.error_kind.as_deref(), Some("no_tables_found"));
    assert!(row
        .error_detail
        .as_deref()
        .unwrap()
        .contains("no tables were found"));
    assert!(row.result_key.is_none());
    assert_eq!(row.attempt_count, 1);

    // A genuine attempt happened, so the quota slot stays consumed.
    let quota = server.metadata().get_quota("user-1").await.unwrap().unwrap();
    assert_eq!(quota.used_count, 1);
}

#[tokio::test]
async fn encrypted_pdf_fails_unparsable_without_retry() {
    let server = TestServer::new().await;
    let (job_id, status, _) = submit_job(&server, "user-1", &encrypted_pdf()).await;
    assert_eq!(status, StatusCode::OK);

    drain_queue(&server).await;

    let row = server.job_row(&job_id).await;
    assert_eq!(row.status, "failed");
    assert_eq!(row.error_kind.as_deref(), Some("unparsable_document"));
    assert!(row
        .error_detail
        .as_deref()
        .unwrap()
        .contains("could not be read"));
    // Terminal on the first occurrence: exactly one attempt.
    assert_eq!(row.attempt_count, 1);
}

#[tokio::test]
async fn transient_failures_retry_then_succeed() {
    let extractor = Arc::new(ScriptedExtractor::new(&[
        ScriptedOutcome::Transient,
        ScriptedOutcome::Tables(2),
    ]));
    let server = TestServer::with_extractor(extractor).await;
    let (job_id, _, _) = submit_job(&server, "user-1", &tabular_pdf()).await;

    // First pass hits the transient failure and requeues.
    assert!(process_one(&server.state).await.unwrap());
    let row = server.job_row(&job_id).await;
    assert_eq!(row.status, "queued");
    assert_eq!(row.attempt_count, 1);
    assert!(row.error_detail.is_none());

    // Second pass succeeds.
    assert!(process_one(&server.state).await.unwrap());
    let row = server.job_row(&job_id).await;
    assert_eq!(row.status, "completed");
    assert_eq!(row.attempt_count, 2);
    assert_eq!(row.table_count, Some(2));
}

#[tokio::test]
async fn transient_failures_exhaust_the_attempt_budget() {
    let extractor = Arc::new(ScriptedExtractor::new(&[
        ScriptedOutcome::Transient,
        ScriptedOutcome::Transient,
        ScriptedOutcome::Transient,
    ]));
    let server = TestServer::with_extractor(extractor).await;
    let max_attempts = server.state.config.worker.max_attempts;
    assert_eq!(max_attempts, 3);

    let (job_id, _, _) = submit_job(&server, "user-1", &tabular_pdf()).await;
    drain_queue(&server).await;

    let row = server.job_row(&job_id).await;
    assert_eq!(row.status, "failed");
    assert_eq!(row.error_kind.as_deref(), Some("retries_exhausted"));
    assert_eq!(row.attempt_count, max_attempts);
    assert!(row
        .error_detail
        .as_deref()
        .unwrap()
        .contains("try again later"));
    assert!(row.result_key.is_none());
}

#[tokio::test]
async fn terminal_jobs_carry_exactly_one_of_result_or_error() {
    let extractor = Arc::new(ScriptedExtractor::new(&[
        ScriptedOutcome::Tables(1),
        ScriptedOutcome::NoTables,
        ScriptedOutcome::Unparsable,
        ScriptedOutcome::Transient,
        ScriptedOutcome::Transient,
        ScriptedOutcome::Transient,
    ]));
    let server = TestServer::with_extractor(extractor).await;

    let mut job_ids = Vec::new();
    for _ in 0..4 {
        let (job_id, status, _) = submit_job(&server, "user-1", &tabular_pdf()).await;
        assert_eq!(status, StatusCode::OK);
        job_ids.push(job_id);
    }
    drain_queue(&server).await;

    for job_id in &job_ids {
        let row = server.job_row(job_id).await;
        let status = row.status.as_str();
        assert!(
            status == "completed" || status == "failed",
            "job {job_id} not terminal: {status}"
        );
        // Exactly one of result_key / error_detail, never both or neither.
        assert_eq!(
            row.result_key.is_some(),
            status == "completed",
            "result_key mismatch for {status}"
        );
        assert_eq!(
            row.error_detail.is_some(),
            status == "failed",
            "error_detail mismatch for {status}"
        );
    }
}

#[tokio::test]
async fn sweep_requeues_jobs_stuck_in_processing() {
    let server = TestServer::with_config(|config| {
        // Everything in processing is immediately "stuck".
        config.worker.processing_timeout_secs = 0;
    })
    .await;
    let (job_id, _, _) = submit_job(&server, "user-1", &tabular_pdf()).await;

    // A worker claims the job and then disappears without finishing.
    let claimed = server
        .metadata()
        .claim_next_queued(OffsetDateTime::now_utc() - time::Duration::seconds(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.job_id.to_string(), job_id);

    let swept = sweep_once(&server.state).await.unwrap();
    assert_eq!(swept, 1);
    assert_eq!(server.job_row(&job_id).await.status, "queued");

    // The job still converts on the next pass.
    drain_queue(&server).await;
    assert_eq!(server.job_row(&job_id).await.status, "completed");
}

#[tokio::test]
async fn sweep_fails_stuck_jobs_at_the_attempt_bound() {
    let server = TestServer::with_config(|config| {
        config.worker.processing_timeout_secs = 0;
        config.worker.max_attempts = 1;
    })
    .await;
    let (job_id, _, _) = submit_job(&server, "user-1", &tabular_pdf()).await;

    server
        .metadata()
        .claim_next_queued(OffsetDateTime::now_utc() - time::Duration::seconds(1))
        .await
        .unwrap()
        .unwrap();

    sweep_once(&server.state).await.unwrap();

    let row = server.job_row(&job_id).await;
    assert_eq!(row.status, "failed");
    assert_eq!(row.error_kind.as_deref(), Some("retries_exhausted"));
}

#[tokio::test]
async fn startup_recovery_requeues_orphaned_processing_jobs() {
    let server = TestServer::new().await;
    let (job_id, _, _) = submit_job(&server, "user-1", &tabular_pdf()).await;

    // Simulate a crash mid-processing: the claim happened but no worker of
    // this instance is running.
    server
        .metadata()
        .claim_next_queued(OffsetDateTime::now_utc() - time::Duration::seconds(1))
        .await
        .unwrap()
        .unwrap();

    let recovered = recover_orphaned_jobs(&server.state).await.unwrap();
    assert_eq!(recovered, 1);
    assert_eq!(server.job_row(&job_id).await.status, "queued");
}
