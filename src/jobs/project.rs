//! Caller-facing projection of a finished polling session.
//!
//! Strips vendor envelope keys from job documents and turns an [`Outcome`]
//! into the flags a module reports (`failed`, `changed`, `skipped`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{JobReport, Outcome};

/// Substring identifying OData envelope keys.
pub const ODATA_MARKER: &str = "@odata";

/// Remove every key containing `@odata`, at any depth.
pub fn strip_odata(value: &mut Value) {
    match value {
        Value::Object(map) => strip_odata_map(map),
        Value::Array(items) => items.iter_mut().for_each(strip_odata),
        _ => {}
    }
}

/// [`strip_odata`] for a bare JSON object.
pub fn strip_odata_map(map: &mut Map<String, Value>) {
    map.retain(|key, _| !key.contains(ODATA_MARKER));
    map.values_mut().for_each(strip_odata);
}

/// Remove top-level keys containing `needle`.
pub fn strip_keys_containing(map: &mut Map<String, Value>, needle: &str, case_sensitive: bool) {
    if case_sensitive {
        map.retain(|key, _| !key.contains(needle));
    } else {
        let needle = needle.to_lowercase();
        map.retain(|key, _| !key.to_lowercase().contains(&needle));
    }
}

/// How a partially successful job is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialPolicy {
    /// Report `failed=true`.
    #[default]
    Fail,
    /// Report success, with the vendor message.
    Succeed,
}

/// How a job that outlived the wait budget is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Report `failed=true`.
    #[default]
    Fail,
    /// Report success with the timeout message as a warning.
    Warn,
}

/// Caller choices for the ambiguous outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionPolicy {
    /// Partial success handling
    pub partial: PartialPolicy,
    /// Timeout handling
    pub timeout: TimeoutPolicy,
}

/// The stable external result shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedResult {
    /// Whether the caller should report failure
    pub failed: bool,
    /// Whether the job changed the target
    pub changed: bool,
    /// Whether the operation was skipped
    pub skipped: bool,
    /// User-facing message
    pub msg: String,
    /// Raw classification, e.g. `partially_succeeded` or `timed_out`
    pub outcome: String,
    /// Last job document, without OData keys
    pub job_details: Value,
    /// Seconds spent polling
    pub elapsed_seconds: u64,
}

/// Maps polling reports to [`ProjectedResult`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultProjector {
    policy: ProjectionPolicy,
}

/// Message used when the job reports no text of its own.
pub const GENERIC_SUCCESS_MSG: &str = "Job completed successfully.";

impl ResultProjector {
    /// Create a projector with the given policy.
    pub fn new(policy: ProjectionPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    pub fn policy(&self) -> ProjectionPolicy {
        self.policy
    }

    /// Project a finished polling session.
    pub fn project(&self, report: &JobReport) -> ProjectedResult {
        let outcome = &report.outcome;
        let mut job_details = outcome.job().to_value();
        strip_odata(&mut job_details);

        let vendor_msg = || outcome.job().message.clone();

        let (failed, changed, skipped, msg) = match outcome {
            Outcome::Succeeded(_) => (
                false,
                true,
                false,
                vendor_msg().unwrap_or_else(|| GENERIC_SUCCESS_MSG.to_string()),
            ),
            Outcome::Unchanged(_) => (
                false,
                false,
                false,
                vendor_msg().unwrap_or_else(|| "No changes found to be applied.".to_string()),
            ),
            Outcome::PartiallySucceeded { reason, .. } => (
                self.policy.partial == PartialPolicy::Fail,
                true,
                false,
                reason.clone(),
            ),
            Outcome::Failed { reason, .. } => (true, false, false, reason.clone()),
            Outcome::Skipped { reason, .. } => (false, false, true, reason.clone()),
            Outcome::TimedOut { .. } => (
                self.policy.timeout == TimeoutPolicy::Fail,
                true,
                false,
                timeout_message(report.max_wait_secs),
            ),
        };

        ProjectedResult {
            failed,
            changed,
            skipped,
            msg,
            outcome: outcome.label().to_string(),
            job_details,
            elapsed_seconds: report.elapsed_secs(),
        }
    }
}

/// `The job is not complete after {N} seconds.`
pub fn timeout_message(max_wait_secs: u64) -> String {
    format!("The job is not complete after {} seconds.", max_wait_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobStateDocument, StateLocator};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn report(outcome: Outcome) -> JobReport {
        JobReport {
            job_id: "JID_1".to_string(),
            outcome,
            elapsed: Duration::from_secs(12),
            polls: 3,
            max_wait_secs: 60,
        }
    }

    fn doc(value: Value) -> JobStateDocument {
        JobStateDocument::from_value(value, &StateLocator::Redfish).unwrap()
    }

    #[test]
    fn test_strip_odata_nested() {
        let mut value = json!({
            "@odata.context": "/redfish/v1/$metadata#DellJob.DellJob",
            "@odata.id": "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_1",
            "Id": "JID_1",
            "Messages@odata.count": 1,
            "Messages": [{"@odata.type": "#Message.v1_0.Message", "MessageId": "SYS053"}],
            "Oem": {"Dell": {"@odata.type": "#DellJob", "Name": "Configure"}}
        });
        strip_odata(&mut value);
        assert_eq!(
            value,
            json!({
                "Id": "JID_1",
                "Messages": [{"MessageId": "SYS053"}],
                "Oem": {"Dell": {"Name": "Configure"}}
            })
        );
    }

    #[test]
    fn test_strip_keys_containing_case_handling() {
        let mut map = json!({"@OData.id": 1, "@odata.type": 2, "Id": 3})
            .as_object()
            .cloned()
            .unwrap();
        let mut sensitive = map.clone();

        strip_keys_containing(&mut map, "@odata.", false);
        assert_eq!(Value::Object(map), json!({"Id": 3}));

        strip_keys_containing(&mut sensitive, "@odata.", true);
        assert_eq!(Value::Object(sensitive), json!({"@OData.id": 1, "Id": 3}));
    }

    #[test]
    fn test_project_succeeded() {
        let projected = ResultProjector::default().project(&report(Outcome::Succeeded(doc(json!({
            "@odata.id": "/jobs/JID_1",
            "JobState": "Completed",
            "Message": "Job completed successfully."
        })))));

        assert!(!projected.failed);
        assert!(projected.changed);
        assert_eq!(projected.outcome, "succeeded");
        assert_eq!(projected.msg, "Job completed successfully.");
        assert_eq!(
            projected.job_details,
            json!({"JobState": "Completed", "Message": "Job completed successfully."})
        );
        assert_eq!(projected.elapsed_seconds, 12);
    }

    #[test]
    fn test_project_succeeded_without_message() {
        let projected =
            ResultProjector::default().project(&report(Outcome::Succeeded(doc(json!({"JobState": "OK"})))));
        assert_eq!(projected.msg, GENERIC_SUCCESS_MSG);
    }

    #[test]
    fn test_project_partial_follows_policy() {
        let outcome = Outcome::PartiallySucceeded {
            job: doc(json!({"JobState": "CompletedWithErrors", "Message": "2 of 3 applied."})),
            reason: "2 of 3 applied.".to_string(),
        };

        let strict = ResultProjector::default().project(&report(outcome.clone()));
        assert!(strict.failed);
        assert!(strict.changed);
        assert_eq!(strict.outcome, "partially_succeeded");

        let lenient = ResultProjector::new(ProjectionPolicy {
            partial: PartialPolicy::Succeed,
            ..ProjectionPolicy::default()
        })
        .project(&report(outcome));
        assert!(!lenient.failed);
        assert_eq!(lenient.msg, "2 of 3 applied.");
    }

    #[test]
    fn test_project_failed_and_skipped() {
        let failed = ResultProjector::default().project(&report(Outcome::Failed {
            job: doc(json!({"JobState": "Failed"})),
            reason: "Job is in Failed state.".to_string(),
        }));
        assert!(failed.failed);
        assert!(!failed.changed);

        let skipped = ResultProjector::default().project(&report(Outcome::Skipped {
            job: doc(json!({"JobState": "Failed", "MessageId": "LIC018"})),
            reason: "License already imported.".to_string(),
        }));
        assert!(!skipped.failed);
        assert!(skipped.skipped);
        assert_eq!(skipped.outcome, "skipped");
    }

    #[test]
    fn test_project_timed_out() {
        let outcome = Outcome::TimedOut {
            job: doc(json!({"JobState": "Running"})),
            elapsed_secs: 60,
        };

        let strict = ResultProjector::default().project(&report(outcome.clone()));
        assert!(strict.failed);
        assert_eq!(strict.msg, "The job is not complete after 60 seconds.");
        assert_eq!(strict.outcome, "timed_out");

        let warn = ResultProjector::new(ProjectionPolicy {
            timeout: TimeoutPolicy::Warn,
            ..ProjectionPolicy::default()
        })
        .project(&report(outcome));
        assert!(!warn.failed);
        assert!(warn.changed);
    }
}
