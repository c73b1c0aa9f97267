//! Job references and job state documents.
//!
//! A [`JobReference`] names a pollable job; a [`JobStateDocument`] is one
//! snapshot of it as returned by the controller.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};

/// State reported when the document carries no recognizable state field.
pub const UNKNOWN_STATE: &str = "Unknown";

/// Placeholder substituted by [`JobReference::rebase`].
pub const JOB_ID_PLACEHOLDER: &str = "{job_id}";

/// Identifies a pollable remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReference {
    tracking_uri: String,
    job_id: String,
}

impl JobReference {
    /// Create a reference from the URI returned in a `Location` header.
    ///
    /// The job id is the last path segment, with any query string dropped.
    /// OME style segments such as `Jobs(10123)` yield the parenthesized id.
    pub fn new(tracking_uri: impl Into<String>) -> Result<Self> {
        let tracking_uri = tracking_uri.into().trim().to_string();
        if tracking_uri.is_empty() {
            return Err(Error::invalid_tracking_uri(
                tracking_uri,
                "tracking URI must not be empty",
            ));
        }

        let job_id = Self::extract_job_id(&tracking_uri).ok_or_else(|| {
            Error::invalid_tracking_uri(&tracking_uri, "no job id in last path segment")
        })?;

        Ok(Self {
            tracking_uri,
            job_id,
        })
    }

    /// Build a reference from a job id and a URI template containing `{job_id}`.
    pub fn from_job_id(template: &str, job_id: &str) -> Result<Self> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(Error::invalid_tracking_uri(template, "job id must not be empty"));
        }
        if !template.contains(JOB_ID_PLACEHOLDER) {
            return Err(Error::invalid_tracking_uri(
                template,
                format!("template must contain {}", JOB_ID_PLACEHOLDER),
            ));
        }
        Ok(Self {
            tracking_uri: template.replace(JOB_ID_PLACEHOLDER, job_id),
            job_id: job_id.to_string(),
        })
    }

    /// Point this job at a different resource collection, keeping its id.
    ///
    /// iDRAC hands out task-service locations for jobs that are better
    /// tracked under the manager's job collection.
    pub fn rebase(&self, template: &str) -> Result<Self> {
        Self::from_job_id(template, &self.job_id)
    }

    /// The resource path to poll.
    pub fn tracking_uri(&self) -> &str {
        &self.tracking_uri
    }

    /// The job id, for display and logging.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn extract_job_id(uri: &str) -> Option<String> {
        let path = uri.split(['?', '#']).next().unwrap_or(uri);
        let segment = path.trim_end_matches('/').rsplit('/').next()?.trim();
        if segment.is_empty() || segment.contains(':') {
            return None;
        }

        if let (Some(open), true) = (segment.find('('), segment.ends_with(')')) {
            let inner = segment[open + 1..segment.len() - 1].trim_matches(['\'', '"']);
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }

        Some(segment.to_string())
    }
}

impl fmt::Display for JobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.job_id)
    }
}

/// Where the state string lives inside a job document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StateLocator {
    /// Redfish `JobState`, falling back to the task service `TaskState`.
    #[default]
    Redfish,
    /// OME `LastRunStatus.Id`, rendered as its numeric string.
    Ome,
    /// Any nested field, addressed by its key path.
    Field(Vec<String>),
}

impl StateLocator {
    /// Build a field locator from a dotted path such as `Status.State`.
    pub fn field(path: &str) -> Self {
        StateLocator::Field(path.split('.').map(str::to_string).collect())
    }

    fn locate(&self, raw: &Map<String, Value>) -> Option<String> {
        match self {
            StateLocator::Redfish => ["JobState", "TaskState"]
                .iter()
                .find_map(|key| raw.get(*key).and_then(state_string)),
            StateLocator::Ome => raw
                .get("LastRunStatus")
                .and_then(|status| status.get("Id"))
                .and_then(state_string),
            StateLocator::Field(path) => {
                let mut current = raw.get(path.first()?)?;
                for key in &path[1..] {
                    current = current.get(key)?;
                }
                state_string(current)
            }
        }
    }
}

fn state_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A snapshot of a job resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStateDocument {
    /// Full JSON body of the last GET.
    pub raw: Map<String, Value>,
    /// Vendor-reported state, never empty.
    pub job_state: String,
    /// Vendor message id of the latest status line.
    pub message_id: Option<String>,
    /// Human-readable status text.
    pub message: Option<String>,
    /// Progress, when the controller reports it.
    pub percent_complete: Option<u64>,
}

impl JobStateDocument {
    /// Interpret a JSON body as a job document.
    ///
    /// Returns `None` if the body is not a JSON object.
    pub fn from_value(raw: Value, locator: &StateLocator) -> Option<Self> {
        match raw {
            Value::Object(map) => Some(Self::from_map(map, locator)),
            _ => None,
        }
    }

    /// Interpret a JSON object as a job document.
    pub fn from_map(raw: Map<String, Value>, locator: &StateLocator) -> Self {
        let job_state = locator
            .locate(&raw)
            .unwrap_or_else(|| UNKNOWN_STATE.to_string());

        let first_message = raw
            .get("Messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.first());

        let message_id = text_field(&raw, "MessageId")
            .or_else(|| first_message.and_then(|m| m.get("MessageId")).and_then(text));
        let message = text_field(&raw, "Message")
            .or_else(|| first_message.and_then(|m| m.get("Message")).and_then(text));
        let percent_complete = raw.get("PercentComplete").and_then(Value::as_u64);

        Self {
            raw,
            job_state,
            message_id,
            message,
            percent_complete,
        }
    }

    /// The raw document as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.raw.clone())
    }
}

fn text_field(raw: &Map<String, Value>, key: &str) -> Option<String> {
    raw.get(key).and_then(text)
}

fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_reference_from_location() {
        let job = JobReference::new("/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_123456789")
            .unwrap();
        assert_eq!(job.job_id(), "JID_123456789");
        assert_eq!(
            job.tracking_uri(),
            "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_123456789"
        );
    }

    #[test]
    fn test_job_reference_trailing_slash_and_query() {
        let job = JobReference::new("https://192.168.0.1/redfish/v1/TaskService/Tasks/JID_42/?$select=JobState")
            .unwrap();
        assert_eq!(job.job_id(), "JID_42");
    }

    #[test]
    fn test_job_reference_ome_style() {
        let job = JobReference::new("JobService/Jobs(10123)").unwrap();
        assert_eq!(job.job_id(), "10123");
    }

    #[test]
    fn test_job_reference_rejects_empty() {
        assert!(JobReference::new("   ").is_err());
        assert!(JobReference::new("/").is_err());
    }

    #[test]
    fn test_rebase_onto_manager_jobs() {
        let job = JobReference::new("/redfish/v1/TaskService/Tasks/JID_7").unwrap();
        let rebased = job
            .rebase("/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/{job_id}")
            .unwrap();
        assert_eq!(
            rebased.tracking_uri(),
            "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_7"
        );
        assert_eq!(rebased.job_id(), "JID_7");
        assert!(job.rebase("/redfish/v1/Jobs").is_err());
    }

    #[test]
    fn test_document_redfish_fields() {
        let doc = JobStateDocument::from_value(
            json!({
                "@odata.id": "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_1",
                "JobState": "Completed",
                "MessageId": "SYS053",
                "Message": "Successfully scheduled a job.",
                "PercentComplete": 100
            }),
            &StateLocator::Redfish,
        )
        .unwrap();

        assert_eq!(doc.job_state, "Completed");
        assert_eq!(doc.message_id.as_deref(), Some("SYS053"));
        assert_eq!(doc.message.as_deref(), Some("Successfully scheduled a job."));
        assert_eq!(doc.percent_complete, Some(100));
    }

    #[test]
    fn test_document_task_state_and_messages_fallback() {
        let doc = JobStateDocument::from_value(
            json!({
                "TaskState": "Exception",
                "Messages": [
                    {"MessageId": "IDRAC.2.9.SYS098", "Message": "Unable to run diagnostics."}
                ]
            }),
            &StateLocator::Redfish,
        )
        .unwrap();

        assert_eq!(doc.job_state, "Exception");
        assert_eq!(doc.message_id.as_deref(), Some("IDRAC.2.9.SYS098"));
        assert_eq!(doc.message.as_deref(), Some("Unable to run diagnostics."));
    }

    #[test]
    fn test_document_ome_status_code() {
        let doc = JobStateDocument::from_value(
            json!({"Id": 10123, "LastRunStatus": {"Id": 2060, "Name": "Completed"}}),
            &StateLocator::Ome,
        )
        .unwrap();
        assert_eq!(doc.job_state, "2060");
    }

    #[test]
    fn test_document_field_locator() {
        let doc = JobStateDocument::from_value(
            json!({"Status": {"State": "Enabled"}}),
            &StateLocator::field("Status.State"),
        )
        .unwrap();
        assert_eq!(doc.job_state, "Enabled");
    }

    #[test]
    fn test_document_missing_state_is_unknown() {
        let doc = JobStateDocument::from_value(json!({"Id": "JID_1", "JobState": ""}), &StateLocator::Redfish)
            .unwrap();
        assert_eq!(doc.job_state, UNKNOWN_STATE);
        assert!(doc.message_id.is_none());
    }

    #[test]
    fn test_document_rejects_non_object() {
        assert!(JobStateDocument::from_value(json!(["JobState"]), &StateLocator::Redfish).is_none());
        assert!(JobStateDocument::from_value(json!("Completed"), &StateLocator::Redfish).is_none());
    }
}
