//! Provision a project, then drive its plan through fake converter scripts
//! and check what lands in the store.

#![cfg(unix)]

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::harness::{
    CONVERTER_CRASH, CONVERTER_MISSING_SRC_LANG, CONVERTER_OK, CONVERTER_SLOW, VALIDATOR_OK,
};
use common::{RequestBuilder, TestHarness};
use linguaforge::conversion::{
    BroadcastSink, ConversionOutcome, FailureKind, NoopSink, OutputStream, TracingSink,
};
use linguaforge::db::records::{FileRole, WorkStatus};
use linguaforge::provision::{NoopProgress, ProvisionOutcome};

async fn provision_two_pairs(harness: &TestHarness) -> ProvisionOutcome {
    let source = harness.stage("brochure.docx", b"doc");
    let request = RequestBuilder::new("Convertible")
        .pair("en-US", "de-DE")
        .pair("en-US", "fr-FR")
        .asset("d1", &source, FileRole::Processable)
        .build();
    harness
        .orchestrator()
        .provision(&request, &CancellationToken::new(), &NoopProgress)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_record_plan_completes_every_job() {
    let harness = TestHarness::new();
    let outcome = provision_two_pairs(&harness).await;
    let runner = harness.runner(CONVERTER_OK, Some(VALIDATOR_OK));
    let sink = BroadcastSink::new(64);
    let mut rx = sink.subscribe();

    let reports = runner
        .record_plan(
            &harness.store,
            &outcome.plan,
            harness.settings.max_parallel_conversions,
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.outcome.is_success() && r.validated));

    for task in &outcome.plan {
        assert!(task.xliff_abs_path.is_file());
        let artifact = harness.store.find_artifact(task.artifact_id).await.unwrap().unwrap();
        assert_eq!(artifact.status, WorkStatus::Completed);
        assert_eq!(artifact.size_bytes, Some(22));
        let job = harness
            .store
            .find_job(task.artifact_id, &task.job_type)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, WorkStatus::Completed);
        assert_eq!(job.error_log, None);
    }

    let mut streamed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        streamed.push(event);
    }
    assert!(streamed
        .iter()
        .any(|e| e.stream == OutputStream::Stdout && e.line.starts_with("Converting to")));
}

#[tokio::test]
async fn test_known_failure_is_recorded_with_kind() {
    let harness = TestHarness::new();
    let outcome = provision_two_pairs(&harness).await;
    let runner = harness.runner(CONVERTER_MISSING_SRC_LANG, None);

    let task = &outcome.plan[0];
    let report = runner
        .record_task(&harness.store, task, &TracingSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        ConversionOutcome::KnownFailure {
            kind: FailureKind::MissingArgument,
            message: "Missing -srcLang parameter".to_string(),
        }
    );
    let job = harness
        .store
        .find_job(task.artifact_id, &task.job_type)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, WorkStatus::Failed);
    assert_eq!(
        job.error_log.as_deref(),
        Some("missing_argument: Missing -srcLang parameter")
    );
    let err = report.outcome.to_error().unwrap();
    assert!(!err.needs_review());
    assert!(!err.user_message().contains("srcLang"));
}

#[tokio::test]
async fn test_unknown_failure_needs_review_and_can_be_rerun() {
    let harness = TestHarness::new();
    let outcome = provision_two_pairs(&harness).await;
    let task = &outcome.plan[0];

    let report = harness
        .runner(CONVERTER_CRASH, None)
        .record_task(&harness.store, task, &NoopSink, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(report.outcome, ConversionOutcome::UnknownFailure { .. }));
    assert!(report.outcome.to_error().unwrap().needs_review());

    // A later explicit run re-queues the failed job.
    let rerun = harness
        .runner(CONVERTER_OK, None)
        .record_task(&harness.store, task, &NoopSink, &CancellationToken::new())
        .await
        .unwrap();
    assert!(rerun.outcome.is_success());
    let job = harness
        .store
        .find_job(task.artifact_id, &task.job_type)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, WorkStatus::Completed);
}

#[tokio::test]
async fn test_cancelling_a_running_conversion_records_cancelled() {
    let harness = TestHarness::new();
    let outcome = provision_two_pairs(&harness).await;
    let runner = harness.runner(CONVERTER_SLOW, None);
    let task = &outcome.plan[0];
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        runner.record_task(&harness.store, task, &NoopSink, &cancel),
    )
    .await
    .expect("cancellation did not stop the converter")
    .unwrap();

    assert_eq!(report.outcome, ConversionOutcome::Cancelled);
    let artifact = harness.store.find_artifact(task.artifact_id).await.unwrap().unwrap();
    assert_eq!(artifact.status, WorkStatus::Cancelled);
    assert!(!task.xliff_abs_path.exists());
}

#[tokio::test]
async fn test_sequential_plan_with_limit_one() {
    let harness = TestHarness::new();
    let outcome = provision_two_pairs(&harness).await;
    let runner = harness.runner(CONVERTER_OK, None);

    let reports = runner
        .run_plan(&outcome.plan, 1, &NoopSink, &CancellationToken::new())
        .await;

    let order: Vec<_> = reports.iter().map(|r| r.task_id).collect();
    let planned: Vec<_> = outcome.plan.iter().map(|t| t.task_id).collect();
    assert_eq!(order, planned);
    // run_plan does not touch the store.
    assert_eq!(outcome.bundle.jobs.len(), 2);
    for job in harness
        .store
        .list_jobs_for_project(outcome.bundle.project.project_id)
        .await
        .unwrap()
    {
        assert_eq!(job.status, WorkStatus::Pending);
    }
}
