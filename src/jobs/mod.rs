//! Asynchronous job tracking.
//!
//! The pieces compose bottom-up:
//!
//! - [`JobReference`] and [`JobStateDocument`] describe a job and one snapshot of it
//! - [`JobStatusFetcher`] performs a single GET of the job resource
//! - [`JobStateClassifier`] decides whether a snapshot is terminal
//! - [`PollingLoop`] repeats fetch and classify within a [`PollBudget`]
//! - [`ResultProjector`] turns the final [`JobReport`] into module flags
//!
//! ```rust,ignore
//! use openmanage::jobs::{start_polling, OverrideTable, ResultProjector};
//!
//! let report = start_polling(&client, &location, 1200, 10, OverrideTable::new()).await?;
//! let result = ResultProjector::default().project(&report);
//! ```

pub mod classify;
pub mod document;
pub mod fetch;
pub mod poll;
pub mod project;

pub use classify::{
    Classification, JobPhase, JobStateClassifier, OutcomeKind, OverrideTable, StateTable,
};
pub use document::{JobReference, JobStateDocument, StateLocator, JOB_ID_PLACEHOLDER, UNKNOWN_STATE};
pub use fetch::{fetch_document, JobStatusFetcher};
pub use poll::{
    start_polling, JobReport, Outcome, PollBudget, PollSummary, PollingLoop,
    NEGATIVE_OR_ZERO_TIMEOUT_MSG,
};
pub use project::{
    strip_keys_containing, strip_odata, strip_odata_map, timeout_message, PartialPolicy,
    ProjectedResult, ProjectionPolicy, ResultProjector, TimeoutPolicy, GENERIC_SUCCESS_MSG,
};
