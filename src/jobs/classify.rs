//! Job state classification.
//!
//! Maps a [`JobStateDocument`] onto a terminal or non-terminal
//! [`Classification`]. Vendor state strings are data ([`StateTable`]) and
//! message-id quirks are data ([`OverrideTable`]), so one classifier serves
//! every caller.
//!
//! Anything the table does not recognize is treated as still in progress:
//! an unfamiliar state string from newer firmware keeps the loop polling
//! instead of being reported as a failure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::JobStateDocument;
use crate::error::{Error, Result};

/// The outcome a terminal job settles into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The job did what was asked.
    Succeeded,
    /// The job finished but nothing needed to change.
    Unchanged,
    /// The job finished with errors (`CompletedWithErrors`).
    PartiallySucceeded,
    /// The job failed.
    Failed,
    /// The operation does not apply to this target (e.g. unlicensed feature).
    Skipped,
}

impl OutcomeKind {
    /// Stable snake_case name, as used in configuration and module output.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Succeeded => "succeeded",
            OutcomeKind::Unchanged => "unchanged",
            OutcomeKind::PartiallySucceeded => "partially_succeeded",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Skipped => "skipped",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "succeeded" | "success" | "ok" => Ok(OutcomeKind::Succeeded),
            "unchanged" | "no_change" | "idempotent" => Ok(OutcomeKind::Unchanged),
            "partially_succeeded" | "partial" | "completed_with_errors" => {
                Ok(OutcomeKind::PartiallySucceeded)
            }
            "failed" | "failure" => Ok(OutcomeKind::Failed),
            "skipped" | "skip" => Ok(OutcomeKind::Skipped),
            other => Err(Error::invalid_config(
                "outcome",
                format!(
                    "unknown outcome '{}'. Valid outcomes: succeeded, unchanged, partially_succeeded, failed, skipped",
                    other
                ),
            )),
        }
    }
}

/// Coarse phase of a job as read from its state string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Accepted but not yet running.
    Pending,
    /// Executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with errors.
    PartiallySucceeded,
    /// Finished unsuccessfully.
    Failed,
    /// State string not in the table.
    Unknown,
}

impl JobPhase {
    /// Returns true for phases that end polling.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Succeeded | JobPhase::PartiallySucceeded | JobPhase::Failed
        )
    }
}

/// Result of classifying one job document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Keep polling.
    InProgress(JobPhase),
    /// Stop polling with this outcome.
    Terminal {
        /// Outcome the job settled into
        kind: OutcomeKind,
        /// Override table key that forced the outcome, if any
        forced_by: Option<String>,
    },
}

impl Classification {
    /// Returns true if polling should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Classification::Terminal { .. })
    }
}

/// Known job state strings, grouped by phase.
///
/// Matching is ASCII case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTable {
    /// States of jobs that are accepted but not started
    pub pending: Vec<String>,
    /// States of jobs that are executing
    pub running: Vec<String>,
    /// Terminal success states
    pub succeeded: Vec<String>,
    /// Terminal partial-success states
    pub partial: Vec<String>,
    /// Terminal failure states
    pub failed: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

impl StateTable {
    /// Redfish `JobState` / `TaskState` values, including iDRAC extensions.
    pub fn redfish() -> Self {
        Self {
            pending: strings(&[
                "New",
                "Pending",
                "Queued",
                "Scheduled",
                "Scheduling",
                "Starting",
                "Waiting",
                "ReadyForExecution",
                "PendingActivation",
                "RebootPending",
            ]),
            running: strings(&[
                "Running",
                "Downloading",
                "Updating",
                "Paused",
                "Suspended",
                "Stopping",
                "Cancelling",
            ]),
            succeeded: strings(&["Completed", "Success", "OK", "Downloaded", "RebootCompleted"]),
            partial: strings(&["CompletedWithErrors"]),
            failed: strings(&[
                "Failed",
                "Exception",
                "Killed",
                "RebootFailed",
                "Cancelled",
                "Canceled",
            ]),
        }
    }

    /// OpenManage Enterprise `LastRunStatus.Id` codes.
    ///
    /// 2020 (scheduled) counts as done: scheduling is all a job-creation
    /// request asks of OME.
    pub fn ome() -> Self {
        Self {
            pending: strings(&["2080", "2030", "2040"]),
            running: strings(&["2050", "2100"]),
            succeeded: strings(&["2060", "2020"]),
            partial: strings(&["2090"]),
            failed: strings(&["2070", "2101", "2102", "2103"]),
        }
    }

    /// Reject tables where one state string has two terminal meanings.
    pub fn validate(&self) -> Result<()> {
        let groups = [&self.succeeded, &self.partial, &self.failed];
        let mut seen = BTreeSet::new();
        let mut overlapping = BTreeSet::new();

        for group in groups {
            let unique: BTreeSet<String> = group.iter().map(|s| s.to_ascii_lowercase()).collect();
            for state in unique {
                if !seen.insert(state.clone()) {
                    overlapping.insert(state);
                }
            }
        }

        if overlapping.is_empty() {
            Ok(())
        } else {
            Err(Error::OverlappingStates(overlapping.into_iter().collect()))
        }
    }

    /// Phase of a state string. Unlisted strings are [`JobPhase::Unknown`].
    pub fn phase(&self, state: &str) -> JobPhase {
        let state = state.trim();
        let contains = |group: &[String]| group.iter().any(|s| s.eq_ignore_ascii_case(state));

        if contains(&self.succeeded) {
            JobPhase::Succeeded
        } else if contains(&self.partial) {
            JobPhase::PartiallySucceeded
        } else if contains(&self.failed) {
            JobPhase::Failed
        } else if contains(&self.running) {
            JobPhase::Running
        } else if contains(&self.pending) {
            JobPhase::Pending
        } else {
            JobPhase::Unknown
        }
    }
}

impl Default for StateTable {
    fn default() -> Self {
        Self::redfish()
    }
}

/// Message-id prefixes that force an outcome regardless of job state.
///
/// Keys match either the whole message id or its last dotted segment, so
/// `SYS098` matches `IDRAC.2.9.SYS098`. The longest matching key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    entries: Vec<(String, OutcomeKind)>,
}

impl OverrideTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an override.
    pub fn insert(&mut self, prefix: impl Into<String>, kind: OutcomeKind) {
        let prefix = prefix.into().trim().to_string();
        if prefix.is_empty() {
            return;
        }
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&prefix))
        {
            Some(entry) => entry.1 = kind,
            None => self.entries.push((prefix, kind)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, prefix: impl Into<String>, kind: OutcomeKind) -> Self {
        self.insert(prefix, kind);
        self
    }

    /// Find the override for a message id.
    pub fn lookup(&self, message_id: &str) -> Option<(&str, OutcomeKind)> {
        let message_id = message_id.trim();
        let short_id = message_id.rsplit('.').next().unwrap_or(message_id);

        self.entries
            .iter()
            .filter(|(prefix, _)| {
                starts_with_ignore_case(message_id, prefix) || starts_with_ignore_case(short_id, prefix)
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, kind)| (prefix.as_str(), *kind))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no overrides.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(prefix, outcome)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, OutcomeKind)> {
        self.entries.iter().map(|(prefix, kind)| (prefix.as_str(), *kind))
    }
}

impl<S: Into<String>> FromIterator<(S, OutcomeKind)> for OverrideTable {
    fn from_iter<I: IntoIterator<Item = (S, OutcomeKind)>>(iter: I) -> Self {
        let mut table = OverrideTable::new();
        for (prefix, kind) in iter {
            table.insert(prefix, kind);
        }
        table
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value.len() >= prefix.len()
        && value.is_char_boundary(prefix.len())
        && value[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Pure mapping from job documents to classifications.
#[derive(Debug, Clone, Default)]
pub struct JobStateClassifier {
    states: StateTable,
    overrides: OverrideTable,
}

impl JobStateClassifier {
    /// Create a classifier, validating the state table.
    pub fn new(states: StateTable, overrides: OverrideTable) -> Result<Self> {
        states.validate()?;
        Ok(Self { states, overrides })
    }

    /// Classifier for Redfish jobs with the given overrides.
    pub fn redfish(overrides: OverrideTable) -> Self {
        Self {
            states: StateTable::redfish(),
            overrides,
        }
    }

    /// Classifier for OME jobs with the given overrides.
    pub fn ome(overrides: OverrideTable) -> Self {
        Self {
            states: StateTable::ome(),
            overrides,
        }
    }

    /// The state table in use.
    pub fn states(&self) -> &StateTable {
        &self.states
    }

    /// The override table in use.
    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Classify a job document.
    ///
    /// An override matching the message id wins over the state string.
    pub fn classify(&self, doc: &JobStateDocument) -> Classification {
        if let Some(message_id) = doc.message_id.as_deref() {
            if let Some((prefix, kind)) = self.overrides.lookup(message_id) {
                debug!(
                    message_id,
                    prefix,
                    outcome = %kind,
                    job_state = %doc.job_state,
                    "Message id override applied"
                );
                return Classification::Terminal {
                    kind,
                    forced_by: Some(prefix.to_string()),
                };
            }
        }

        match self.states.phase(&doc.job_state) {
            JobPhase::Succeeded => Classification::Terminal {
                kind: OutcomeKind::Succeeded,
                forced_by: None,
            },
            JobPhase::PartiallySucceeded => Classification::Terminal {
                kind: OutcomeKind::PartiallySucceeded,
                forced_by: None,
            },
            JobPhase::Failed => Classification::Terminal {
                kind: OutcomeKind::Failed,
                forced_by: None,
            },
            phase => Classification::InProgress(phase),
        }
    }
}
