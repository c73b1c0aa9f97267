//! End-to-end polling sessions against a scripted job resource.
//!
//! All tests run on a paused tokio clock, so elapsed times are exact.

mod common;

use common::*;
use openmanage::error::Error;
use openmanage::jobs::{
    start_polling, JobReference, JobStateClassifier, Outcome, OutcomeKind, OverrideTable,
    PollBudget, PollingLoop, ProjectionPolicy, ResultProjector, StateLocator,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_new_running_completed_succeeds() {
    let fetcher = ScriptedFetcher::states(&["New", "Running", "Completed"]);

    let report = assert_ok!(start_polling(&fetcher, JOB_URI, 60, 1, OverrideTable::new()).await);

    assert!(matches!(report.outcome, Outcome::Succeeded(_)));
    assert_eq!(report.elapsed_secs(), 2);
    assert_eq!(report.polls, 3);
    assert_eq!(report.job_id, "JID_123456789012");
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_running_forever_times_out_at_budget() {
    let fetcher = ScriptedFetcher::states(&["Running"]);

    let report = start_polling(&fetcher, JOB_URI, 10, 5, OverrideTable::new())
        .await
        .unwrap();

    match &report.outcome {
        Outcome::TimedOut { job, elapsed_secs } => {
            assert_eq!(*elapsed_secs, 10);
            assert_eq!(job.job_state, "Running");
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    // Two waits of 5s, with the last fetch landing on the deadline.
    assert_eq!(report.elapsed_secs(), 10);
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_license_message_forces_skip() {
    let fetcher = ScriptedFetcher::new(vec![Ok(job_body(
        "Failed",
        Some("LIC018"),
        Some("Unable to complete the operation because the feature is not licensed."),
    ))]);
    let overrides = OverrideTable::new().with("LIC018", OutcomeKind::Skipped);

    let report = start_polling(&fetcher, JOB_URI, 60, 5, overrides).await.unwrap();

    match &report.outcome {
        Outcome::Skipped { reason, job } => {
            assert!(reason.contains("not licensed"));
            assert_eq!(job.message_id.as_deref(), Some("LIC018"));
        }
        other => panic!("expected skipped, got {:?}", other),
    }
    assert_eq!(report.elapsed_secs(), 0);

    let projected = ResultProjector::default().project(&report);
    assert!(projected.skipped);
    assert!(!projected.failed);
    assert_eq!(projected.outcome, "skipped");
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_propagates_without_retry() {
    let fetcher = ScriptedFetcher::new(vec![Err(connection_reset())]);

    let err = assert_err!(start_polling(&fetcher, JOB_URI, 60, 5, OverrideTable::new()).await);

    assert!(err.is_unreachable());
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_completed_with_errors_is_partial() {
    let fetcher = ScriptedFetcher::new(vec![
        Ok(job_body("Running", None, None)),
        Ok(job_body(
            "CompletedWithErrors",
            Some("SYS053"),
            Some("Successfully applied the settings, but some could not be applied."),
        )),
    ]);

    let report = start_polling(&fetcher, JOB_URI, 60, 3, OverrideTable::new())
        .await
        .unwrap();

    assert_eq!(report.outcome.kind(), Some(OutcomeKind::PartiallySucceeded));
    assert_eq!(report.elapsed_secs(), 3);

    let strict = ResultProjector::default().project(&report);
    assert!(strict.failed);
    assert!(strict.changed);
    assert_eq!(strict.outcome, "partially_succeeded");
}

#[tokio::test(start_paused = true)]
async fn test_non_positive_budget_rejected_before_fetch() {
    for (max_wait, interval) in [(0, 5), (-10, 5), (60, 0), (60, -1)] {
        let fetcher = ScriptedFetcher::states(&["Completed"]);
        let err = start_polling(&fetcher, JOB_URI, max_wait, interval, OverrideTable::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidBudget(_)), "{max_wait}/{interval}: {err}");
        assert_eq!(fetcher.calls(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_terminal_on_deadline_beats_timeout() {
    let fetcher = ScriptedFetcher::states(&["Running", "Running", "Failed"]);

    let report = start_polling(&fetcher, JOB_URI, 10, 5, OverrideTable::new())
        .await
        .unwrap();

    assert_eq!(report.outcome.kind(), Some(OutcomeKind::Failed));
    assert_eq!(report.elapsed_secs(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_override_beats_failed_state() {
    let fetcher = ScriptedFetcher::new(vec![Ok(job_body(
        "Failed",
        Some("IDRAC.2.8.SYS098"),
        Some("No changes were applied since the current component configuration matched the requested configuration."),
    ))]);
    let overrides = OverrideTable::new().with("SYS098", OutcomeKind::Unchanged);

    let report = start_polling(&fetcher, JOB_URI, 60, 5, overrides).await.unwrap();

    assert!(matches!(report.outcome, Outcome::Unchanged(_)));
    let projected = ResultProjector::default().project(&report);
    assert!(!projected.failed);
    assert!(!projected.changed);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_outcome_carries_stripped_document() {
    let fetcher = ScriptedFetcher::states(&["Scheduled", "Completed"]);

    let report = start_polling(&fetcher, JOB_URI, 60, 2, OverrideTable::new())
        .await
        .unwrap();

    let job = report.outcome.job();
    assert!(job.raw.keys().all(|k| !k.contains("@odata")));
    assert_eq!(job.raw.get("JobType"), Some(&json!("BIOSConfiguration")));
    assert_eq!(job.percent_complete, Some(100));
}

#[tokio::test(start_paused = true)]
async fn test_fetches_are_spaced_by_interval() {
    let fetcher = ScriptedFetcher::states(&["New", "Downloading", "Updating", "Running", "OK"]);

    start_polling(&fetcher, JOB_URI, 600, 30, OverrideTable::new())
        .await
        .unwrap();

    let times = fetcher.fetch_times();
    assert_eq!(times.len(), 5);
    for pair in times.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(30));
    }
    assert!(fetcher.uris().iter().all(|uri| uri == JOB_URI));
}

#[tokio::test(start_paused = true)]
async fn test_ome_task_sequence() {
    // OME reports LastRunStatus ids: 2050 running, 2060 completed.
    let fetcher = ScriptedFetcher::new(vec![
        Ok(json!({"Id": 10123, "LastRunStatus": {"Id": 2050, "Name": "Running"}})),
        Ok(json!({"Id": 10123, "LastRunStatus": {"Id": 2060, "Name": "Completed"}})),
    ]);
    let classifier = JobStateClassifier::ome(OverrideTable::new());
    let job = JobReference::new("/api/JobService/Jobs(10123)").unwrap();

    let report = PollingLoop::new(&fetcher, &classifier, PollBudget::new(600, 10).unwrap())
        .with_locator(StateLocator::Ome)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.outcome.kind(), Some(OutcomeKind::Succeeded));
    assert_eq!(report.elapsed_secs(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_wait() {
    let fetcher = ScriptedFetcher::states(&["Running"]);
    let classifier = JobStateClassifier::redfish(OverrideTable::new());
    let job = JobReference::new(JOB_URI).unwrap();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(45)).await;
        canceller.cancel();
    });

    let err = PollingLoop::new(&fetcher, &classifier, PollBudget::new(600, 20).unwrap())
        .with_cancellation(token)
        .run(&job)
        .await
        .unwrap_err();

    match err {
        Error::Cancelled {
            job_id,
            elapsed_secs,
            last,
        } => {
            assert_eq!(job_id, "JID_123456789012");
            assert_eq!(elapsed_secs, 45);
            assert_eq!(last.job_state, "Running");
        }
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_projection_policies() {
    let fetcher = ScriptedFetcher::states(&["Running"]);
    let report = start_polling(&fetcher, JOB_URI, 20, 10, OverrideTable::new())
        .await
        .unwrap();

    let strict = ResultProjector::default().project(&report);
    assert!(strict.failed);
    assert_eq!(strict.msg, "The job is not complete after 20 seconds.");
    assert_eq!(strict.outcome, "timed_out");

    let lenient = ResultProjector::new(ProjectionPolicy {
        timeout: openmanage::jobs::TimeoutPolicy::Warn,
        ..ProjectionPolicy::default()
    })
    .project(&report);
    assert!(!lenient.failed);
}
