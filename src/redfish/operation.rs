//! Submitting asynchronous operations and following their jobs.
//!
//! ```text
//! AsyncOperation ──submit──► Submission ──follow──► Tracked
//!                              │ Completed              │ Immediate
//!                              └ Accepted(JobReference) ├ Finished(JobReport)
//!                                                       └ Snapshot
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::client::RedfishResponse;
use crate::error::{Result, TransportError};
use crate::jobs::{
    fetch_document, strip_odata_map, JobReference, JobReport, JobStateClassifier,
    JobStateDocument, JobStatusFetcher, PollBudget, PollingLoop, StateLocator,
};

/// HTTP verbs that can start a controller job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionMethod {
    /// POST, used by Redfish actions
    #[default]
    Post,
    /// PATCH, used by settings resources
    Patch,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl ActionMethod {
    /// Parse a method name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "POST" => Some(ActionMethod::Post),
            "PATCH" => Some(ActionMethod::Patch),
            "PUT" => Some(ActionMethod::Put),
            "DELETE" => Some(ActionMethod::Delete),
            _ => None,
        }
    }

    /// The reqwest method.
    pub fn as_http(&self) -> reqwest::Method {
        match self {
            ActionMethod::Post => reqwest::Method::POST,
            ActionMethod::Patch => reqwest::Method::PATCH,
            ActionMethod::Put => reqwest::Method::PUT,
            ActionMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for ActionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_http().as_str())
    }
}

/// A request that a controller may execute as a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncOperation {
    /// HTTP verb
    pub method: ActionMethod,
    /// Resource path or absolute URL
    pub path: String,
    /// JSON payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl AsyncOperation {
    /// A POST with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: ActionMethod::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    /// A PATCH with a JSON body.
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: ActionMethod::Patch,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// How the controller answered a triggering request.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The operation finished synchronously.
    Completed(RedfishResponse),
    /// The operation runs as a job.
    Accepted(JobReference),
}

impl Submission {
    /// Interpret a successful response.
    ///
    /// `202 Accepted` must name the job in `Location`. A `200 OK` with a
    /// `Location` is tracked too. Every other 2xx is synchronous: a `201
    /// Created` names the new resource, not a job.
    pub fn from_response(response: RedfishResponse) -> Result<Self> {
        let tracks_job =
            response.is_accepted() || response.status == reqwest::StatusCode::OK.as_u16();
        match response.location() {
            Some(location) if tracks_job => {
                let job = JobReference::new(location)?;
                debug!(job_id = %job, status = response.status, "Operation accepted as job");
                Ok(Submission::Accepted(job))
            }
            None if response.is_accepted() => Err(TransportError::MissingLocation {
                url: response.url,
                status: response.status,
            }
            .into()),
            _ => Ok(Submission::Completed(response)),
        }
    }

    /// The job, if one was created.
    pub fn job(&self) -> Option<&JobReference> {
        match self {
            Submission::Accepted(job) => Some(job),
            Submission::Completed(_) => None,
        }
    }
}

/// What following a submission produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Tracked {
    /// No job was created.
    Immediate(RedfishResponse),
    /// The job was polled to a terminal outcome.
    Finished(JobReport),
    /// The job was read once without waiting.
    Snapshot {
        /// The job
        job: JobReference,
        /// Its current state, OData stripped
        document: JobStateDocument,
    },
}

/// Follows jobs with a fixed classifier and budget.
pub struct JobTracker<'a, F: ?Sized> {
    fetcher: &'a F,
    classifier: JobStateClassifier,
    budget: PollBudget,
    locator: StateLocator,
    job_uri_template: Option<String>,
    cancel: Option<CancellationToken>,
}

impl<'a, F> JobTracker<'a, F>
where
    F: JobStatusFetcher + ?Sized,
{
    /// Create a tracker reading Redfish job state.
    pub fn new(fetcher: &'a F, classifier: JobStateClassifier, budget: PollBudget) -> Self {
        Self {
            fetcher,
            classifier,
            budget,
            locator: StateLocator::Redfish,
            job_uri_template: None,
            cancel: None,
        }
    }

    /// Read the state through a different locator.
    pub fn with_locator(mut self, locator: StateLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Poll jobs at `template` (containing `{job_id}`) instead of their `Location`.
    pub fn with_job_uri_template(mut self, template: Option<String>) -> Self {
        self.job_uri_template = template.filter(|t| !t.trim().is_empty());
        self
    }

    /// Allow the wait to be cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The budget in use.
    pub fn budget(&self) -> PollBudget {
        self.budget
    }

    fn target(&self, job: &JobReference) -> Result<JobReference> {
        match &self.job_uri_template {
            Some(template) => job.rebase(template),
            None => Ok(job.clone()),
        }
    }

    /// Poll a job to a terminal outcome.
    pub async fn track(&self, job: &JobReference) -> Result<JobReport> {
        let target = self.target(job)?;
        info!(
            job_id = %target,
            tracking_uri = target.tracking_uri(),
            max_wait_secs = self.budget.max_wait_secs(),
            "Tracking job"
        );

        let mut polling = PollingLoop::new(self.fetcher, &self.classifier, self.budget)
            .with_locator(self.locator.clone());
        if let Some(token) = &self.cancel {
            polling = polling.with_cancellation(token.clone());
        }
        polling.run(&target).await
    }

    /// Read a job once, without classifying or waiting.
    pub async fn snapshot(&self, job: &JobReference) -> Result<JobStateDocument> {
        let target = self.target(job)?;
        let mut document = fetch_document(self.fetcher, target.tracking_uri(), &self.locator).await?;
        strip_odata_map(&mut document.raw);
        debug!(job_id = %target, job_state = %document.job_state, "Fetched job snapshot");
        Ok(document)
    }

    /// Follow a submission: wait for its job, read it once, or pass it through.
    pub async fn follow(&self, submission: Submission, wait: bool) -> Result<Tracked> {
        match submission {
            Submission::Completed(response) => Ok(Tracked::Immediate(response)),
            Submission::Accepted(job) if wait => Ok(Tracked::Finished(self.track(&job).await?)),
            Submission::Accepted(job) => {
                let document = self.snapshot(&job).await?;
                Ok(Tracked::Snapshot { job, document })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::jobs::fetch::MockJobStatusFetcher;
    use crate::jobs::{Outcome, OverrideTable};
    use serde_json::json;
    use std::collections::HashMap;

    fn response(status: u16, location: Option<&str>) -> RedfishResponse {
        let mut headers = HashMap::new();
        if let Some(location) = location {
            headers.insert("location".to_string(), location.to_string());
        }
        RedfishResponse {
            url: "https://idrac/redfish/v1/Systems/System.Embedded.1/Actions/ComputerSystem.Reset"
                .to_string(),
            status,
            headers,
            body: json!(null),
        }
    }

    #[test]
    fn test_accepted_with_location() {
        let submission = Submission::from_response(response(
            202,
            Some("/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_5"),
        ))
        .unwrap();
        assert_eq!(submission.job().map(JobReference::job_id), Some("JID_5"));
    }

    #[test]
    fn test_accepted_without_location_is_transport_error() {
        let err = Submission::from_response(response(202, None)).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::MissingLocation { status: 202, .. })
        ));
    }

    #[test]
    fn test_ok_without_location_is_synchronous() {
        let submission = Submission::from_response(response(204, None)).unwrap();
        assert!(matches!(submission, Submission::Completed(_)));
        assert!(submission.job().is_none());
    }

    #[test]
    fn test_ok_with_location_is_tracked() {
        let submission =
            Submission::from_response(response(200, Some("/redfish/v1/TaskService/Tasks/JID_6")))
                .unwrap();
        assert!(matches!(submission, Submission::Accepted(_)));
    }

    #[test]
    fn test_created_with_location_is_synchronous() {
        let submission = Submission::from_response(response(
            201,
            Some("/redfish/v1/AccountService/Accounts/3"),
        ))
        .unwrap();
        match submission {
            Submission::Completed(response) => {
                assert_eq!(response.status, 201);
                assert_eq!(response.location(), Some("/redfish/v1/AccountService/Accounts/3"));
            }
            other => panic!("expected Completed, got {:?}", other),
        }

        let submission =
            Submission::from_response(response(204, Some("/redfish/v1/Systems/System.Embedded.1")))
                .unwrap();
        assert!(submission.job().is_none());
    }

    #[test]
    fn test_action_method_parse() {
        assert_eq!(ActionMethod::parse("patch"), Some(ActionMethod::Patch));
        assert_eq!(ActionMethod::parse(" POST "), Some(ActionMethod::Post));
        assert_eq!(ActionMethod::parse("GET"), None);
        assert_eq!(ActionMethod::Delete.to_string(), "DELETE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_rebases_onto_template() {
        let mut fetcher = MockJobStatusFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|uri| uri == "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_7")
            .times(1)
            .returning(|_| Ok(json!({"JobState": "Completed", "Message": "Done."})));

        let tracker = JobTracker::new(
            &fetcher,
            JobStateClassifier::redfish(OverrideTable::new()),
            PollBudget::new(60, 5).unwrap(),
        )
        .with_job_uri_template(Some(
            "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/{job_id}".to_string(),
        ));

        let job = JobReference::new("/redfish/v1/TaskService/Tasks/JID_7").unwrap();
        let report = tracker.track(&job).await.unwrap();
        assert!(matches!(report.outcome, Outcome::Succeeded(_)));
    }

    #[tokio::test]
    async fn test_follow_without_wait_takes_snapshot() {
        let mut fetcher = MockJobStatusFetcher::new();
        fetcher.expect_fetch().times(1).returning(|_| {
            Ok(json!({"@odata.id": "/jobs/JID_8", "Id": "JID_8", "JobState": "Scheduled"}))
        });

        let tracker = JobTracker::new(
            &fetcher,
            JobStateClassifier::default(),
            PollBudget::new(60, 5).unwrap(),
        );
        let job = JobReference::new("/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_8").unwrap();

        match tracker.follow(Submission::Accepted(job), false).await.unwrap() {
            Tracked::Snapshot { job, document } => {
                assert_eq!(job.job_id(), "JID_8");
                assert_eq!(document.job_state, "Scheduled");
                assert!(!document.raw.contains_key("@odata.id"));
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_follow_synchronous_completion() {
        let mut fetcher = MockJobStatusFetcher::new();
        fetcher.expect_fetch().times(0);

        let tracker = JobTracker::new(
            &fetcher,
            JobStateClassifier::default(),
            PollBudget::new(60, 5).unwrap(),
        );
        let tracked = tracker
            .follow(Submission::Completed(response(204, None)), true)
            .await
            .unwrap();
        assert!(matches!(tracked, Tracked::Immediate(_)));
    }
}
