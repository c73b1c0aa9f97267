//! The polling loop.
//!
//! A session fetches the job, classifies it, and either stops on a terminal
//! classification, stops on an exhausted budget, or sleeps and fetches again:
//!
//! ```text
//! Waiting ──► Polling ──┬──► Succeeded / Unchanged / Skipped
//!               ▲   │   ├──► PartiallySucceeded / Failed
//!               └───┘   └──► TimedOut
//! ```
//!
//! Classification is checked before the budget on every iteration, so a job
//! that finishes exactly at the deadline reports its real outcome. The sleep
//! between fetches is the only suspension point; it is clamped to the
//! remaining budget and can be interrupted by a [`CancellationToken`].
//!
//! Transport errors are never retried here. One failed GET ends the session.
//!
//! A single fetch may not run past `max_wait + interval`. A fetch still
//! pending at that point ends the session as timed out on the last document,
//! or as an unreachable controller if nothing was ever read.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::project::strip_odata_map;
use super::{
    fetch_document, Classification, JobReference, JobStateClassifier, JobStateDocument,
    JobStatusFetcher, OutcomeKind, OverrideTable, StateLocator,
};
use crate::error::{Error, Result, TransportError};

/// Message for a non-positive wait budget.
pub const NEGATIVE_OR_ZERO_TIMEOUT_MSG: &str =
    "The parameter `job_wait_timeout` value cannot be negative or zero.";

/// Timing contract for one polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    interval: Duration,
    max_wait: Duration,
}

impl PollBudget {
    /// Create a budget from caller-supplied seconds.
    ///
    /// Both values must be positive.
    pub fn new(max_wait_secs: i64, interval_secs: i64) -> Result<Self> {
        if max_wait_secs <= 0 {
            return Err(Error::InvalidBudget(NEGATIVE_OR_ZERO_TIMEOUT_MSG.to_string()));
        }
        if interval_secs <= 0 {
            return Err(Error::InvalidBudget(
                "The poll interval must be a positive number of seconds.".to_string(),
            ));
        }
        Self::from_durations(
            Duration::from_secs(max_wait_secs.unsigned_abs()),
            Duration::from_secs(interval_secs.unsigned_abs()),
        )
    }

    /// Create a budget from durations. Neither may be zero.
    pub fn from_durations(max_wait: Duration, interval: Duration) -> Result<Self> {
        if max_wait.is_zero() {
            return Err(Error::InvalidBudget(NEGATIVE_OR_ZERO_TIMEOUT_MSG.to_string()));
        }
        if interval.is_zero() {
            return Err(Error::InvalidBudget(
                "The poll interval must not be zero.".to_string(),
            ));
        }
        Ok(Self { interval, max_wait })
    }

    /// Delay between fetches.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total time a session may spend polling.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// [`max_wait`](Self::max_wait) in whole seconds.
    pub fn max_wait_secs(&self) -> u64 {
        self.max_wait.as_secs()
    }
}

/// Terminal result of a polling session.
///
/// Every variant carries the last fetched document with OData keys removed.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The job completed.
    Succeeded(JobStateDocument),
    /// The job completed without changing anything.
    Unchanged(JobStateDocument),
    /// The job completed with errors.
    PartiallySucceeded {
        /// Last job document
        job: JobStateDocument,
        /// Vendor message or state description
        reason: String,
    },
    /// The job failed.
    Failed {
        /// Last job document
        job: JobStateDocument,
        /// Vendor message or state description
        reason: String,
    },
    /// A message-id override marked the operation as not applicable.
    Skipped {
        /// Last job document
        job: JobStateDocument,
        /// Vendor message or state description
        reason: String,
    },
    /// The budget ran out while the job was still in progress.
    TimedOut {
        /// Last job document
        job: JobStateDocument,
        /// Seconds spent polling
        elapsed_secs: u64,
    },
}

impl Outcome {
    fn settle(kind: OutcomeKind, mut job: JobStateDocument) -> Self {
        strip_odata_map(&mut job.raw);
        let reason = job
            .message
            .clone()
            .unwrap_or_else(|| format!("Job is in {} state.", job.job_state));

        match kind {
            OutcomeKind::Succeeded => Outcome::Succeeded(job),
            OutcomeKind::Unchanged => Outcome::Unchanged(job),
            OutcomeKind::PartiallySucceeded => Outcome::PartiallySucceeded { job, reason },
            OutcomeKind::Failed => Outcome::Failed { job, reason },
            OutcomeKind::Skipped => Outcome::Skipped { job, reason },
        }
    }

    fn timed_out(mut job: JobStateDocument, elapsed: Duration) -> Self {
        strip_odata_map(&mut job.raw);
        Outcome::TimedOut {
            job,
            elapsed_secs: elapsed.as_secs(),
        }
    }

    /// The last fetched job document.
    pub fn job(&self) -> &JobStateDocument {
        match self {
            Outcome::Succeeded(job) | Outcome::Unchanged(job) => job,
            Outcome::PartiallySucceeded { job, .. }
            | Outcome::Failed { job, .. }
            | Outcome::Skipped { job, .. }
            | Outcome::TimedOut { job, .. } => job,
        }
    }

    /// Consume the outcome, returning the last job document.
    pub fn into_job(self) -> JobStateDocument {
        match self {
            Outcome::Succeeded(job) | Outcome::Unchanged(job) => job,
            Outcome::PartiallySucceeded { job, .. }
            | Outcome::Failed { job, .. }
            | Outcome::Skipped { job, .. }
            | Outcome::TimedOut { job, .. } => job,
        }
    }

    /// The classification the job settled into, or `None` on timeout.
    pub fn kind(&self) -> Option<OutcomeKind> {
        match self {
            Outcome::Succeeded(_) => Some(OutcomeKind::Succeeded),
            Outcome::Unchanged(_) => Some(OutcomeKind::Unchanged),
            Outcome::PartiallySucceeded { .. } => Some(OutcomeKind::PartiallySucceeded),
            Outcome::Failed { .. } => Some(OutcomeKind::Failed),
            Outcome::Skipped { .. } => Some(OutcomeKind::Skipped),
            Outcome::TimedOut { .. } => None,
        }
    }

    /// snake_case label for output.
    pub fn label(&self) -> &'static str {
        self.kind().map_or("timed_out", |kind| kind.as_str())
    }
}

/// What a polling session produced, with its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    /// Job identifier
    pub job_id: String,
    /// Terminal outcome
    pub outcome: Outcome,
    /// Wall-clock time spent polling
    pub elapsed: Duration,
    /// Number of fetches issued
    pub polls: u32,
    /// The budget's limit, in seconds
    pub max_wait_secs: u64,
}

impl JobReport {
    /// [`elapsed`](Self::elapsed) in whole seconds.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.as_secs()
    }
}

/// Summary of a session, for logs and module output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary<'a> {
    /// Job identifier
    pub job_id: &'a str,
    /// Outcome label
    pub outcome: &'static str,
    /// Seconds spent polling
    pub elapsed_seconds: u64,
    /// Number of fetches issued
    pub polls: u32,
}

impl<'a> From<&'a JobReport> for PollSummary<'a> {
    fn from(report: &'a JobReport) -> Self {
        Self {
            job_id: &report.job_id,
            outcome: report.outcome.label(),
            elapsed_seconds: report.elapsed_secs(),
            polls: report.polls,
        }
    }
}

/// Drives repeated fetches of one job until it settles or the budget runs out.
pub struct PollingLoop<'a, F: ?Sized> {
    fetcher: &'a F,
    classifier: &'a JobStateClassifier,
    budget: PollBudget,
    locator: StateLocator,
    cancel: Option<CancellationToken>,
}

impl<'a, F> PollingLoop<'a, F>
where
    F: JobStatusFetcher + ?Sized,
{
    /// Create a loop over the given fetcher and classifier.
    pub fn new(fetcher: &'a F, classifier: &'a JobStateClassifier, budget: PollBudget) -> Self {
        Self {
            fetcher,
            classifier,
            budget,
            locator: StateLocator::default(),
            cancel: None,
        }
    }

    /// Read the state from somewhere other than `JobState`.
    pub fn with_locator(mut self, locator: StateLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Allow the wait between fetches to be interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Poll `job` to a terminal outcome.
    #[instrument(skip(self, job), fields(job_id = %job.job_id()))]
    pub async fn run(&self, job: &JobReference) -> Result<JobReport> {
        let started = Instant::now();
        let max_wait = self.budget.max_wait();
        let fetch_deadline = started + max_wait + self.budget.interval();
        let mut polls: u32 = 0;
        let mut last: Option<JobStateDocument> = None;

        loop {
            let fetched = tokio::time::timeout_at(
                fetch_deadline,
                fetch_document(self.fetcher, job.tracking_uri(), &self.locator),
            )
            .await;
            polls += 1;
            let doc = match fetched {
                Ok(result) => result?,
                Err(_) => return self.fetch_overran(job, last, started.elapsed(), polls),
            };
            let elapsed = started.elapsed();

            debug!(
                poll = polls,
                job_state = %doc.job_state,
                message_id = doc.message_id.as_deref().unwrap_or(""),
                percent_complete = ?doc.percent_complete,
                elapsed_secs = elapsed.as_secs(),
                "Fetched job status"
            );

            let classification = self.classifier.classify(&doc);
            if let Classification::Terminal { kind, forced_by } = classification {
                if let Some(prefix) = forced_by {
                    warn!(
                        job_state = %doc.job_state,
                        override_key = %prefix,
                        outcome = %kind,
                        "Job outcome forced by message id"
                    );
                }
                let report = self.report(job, Outcome::settle(kind, doc), elapsed, polls);
                let summary = PollSummary::from(&report);
                info!(
                    outcome = summary.outcome,
                    elapsed_secs = summary.elapsed_seconds,
                    polls = summary.polls,
                    "Job reached terminal state"
                );
                return Ok(report);
            }

            let remaining = max_wait.saturating_sub(elapsed);
            if remaining.is_zero() {
                return Ok(self.time_out(job, doc, elapsed, polls));
            }

            let delay = self.budget.interval().min(remaining);
            if self.pause(delay).await {
                let elapsed_secs = started.elapsed().as_secs();
                warn!(elapsed_secs, "Job tracking cancelled");
                let mut last_doc = doc;
                strip_odata_map(&mut last_doc.raw);
                return Err(Error::Cancelled {
                    job_id: job.job_id().to_string(),
                    elapsed_secs,
                    last: Box::new(last_doc),
                });
            }
            last = Some(doc);
        }
    }

    /// A fetch was still pending at `max_wait + interval`.
    fn fetch_overran(
        &self,
        job: &JobReference,
        last: Option<JobStateDocument>,
        elapsed: Duration,
        polls: u32,
    ) -> Result<JobReport> {
        warn!(elapsed_secs = elapsed.as_secs(), polls, "Job status request overran the wait budget");
        match last {
            Some(doc) => Ok(self.time_out(job, doc, elapsed, polls)),
            None => Err(TransportError::Unreachable {
                url: job.tracking_uri().to_string(),
                message: format!("no response within {} seconds", elapsed.as_secs()),
            }
            .into()),
        }
    }

    /// Sleep for `delay`. Returns true if cancelled first.
    async fn pause(&self, delay: Duration) -> bool {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    () = token.cancelled() => true,
                    () = tokio::time::sleep(delay) => false,
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                false
            }
        }
    }

    fn time_out(
        &self,
        job: &JobReference,
        doc: JobStateDocument,
        elapsed: Duration,
        polls: u32,
    ) -> JobReport {
        warn!(
            job_state = %doc.job_state,
            max_wait_secs = self.budget.max_wait_secs(),
            polls,
            "Job did not finish within the wait budget"
        );
        self.report(job, Outcome::timed_out(doc, elapsed), elapsed, polls)
    }

    fn report(&self, job: &JobReference, outcome: Outcome, elapsed: Duration, polls: u32) -> JobReport {
        JobReport {
            job_id: job.job_id().to_string(),
            outcome,
            elapsed,
            polls,
            max_wait_secs: self.budget.max_wait_secs(),
        }
    }
}

/// Poll a Redfish job to completion.
///
/// The budget is validated before any request is made.
pub async fn start_polling<F>(
    fetcher: &F,
    tracking_uri: &str,
    max_wait_seconds: i64,
    interval_seconds: i64,
    overrides: OverrideTable,
) -> Result<JobReport>
where
    F: JobStatusFetcher + ?Sized,
{
    let budget = PollBudget::new(max_wait_seconds, interval_seconds)?;
    let job = JobReference::new(tracking_uri)?;
    let classifier = JobStateClassifier::redfish(overrides);
    PollingLoop::new(fetcher, &classifier, budget).run(&job).await
}
