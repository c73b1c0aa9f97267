//! # OpenManage - Redfish Job Tracking for Dell Management Controllers
//!
//! OpenManage submits long-running operations to Dell iDRAC and OpenManage
//! Enterprise (OME) controllers and follows the asynchronous jobs they
//! create until each one reaches a terminal state or a wait budget runs out.
//!
//! ## Core Concepts
//!
//! - **Job reference**: The resource path of a job plus its identifier
//! - **Job state document**: One JSON snapshot of a job, with the state,
//!   message id and message pulled out
//! - **Classifier**: Maps a snapshot to in-progress or a terminal outcome,
//!   consulting message-id overrides first
//! - **Polling loop**: Fetches, classifies and sleeps within a budget
//! - **Projector**: Turns a final outcome into `changed`/`failed`/`skipped`
//! - **Modules**: Parameter-driven entry points built on the above
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           CLI Interface                              │
//! │                    (clap-based command parsing)                      │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Module Registry                             │
//! │   (idrac_job_status_info, redfish_job_tracking, redfish_action)      │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!          ┌─────────────────────────┼─────────────────────────┐
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │   JobTracker    │   │    PollingLoop      │   │   ResultProjector   │
//! │ (submit/follow) │   │ (fetch + classify)  │   │ (changed / failed)  │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//!          │                         │
//!          └─────────────────────────┘
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         RedfishClient                                │
//! │              (reqwest, basic auth or X-Auth-Token)                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use openmanage::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = RedfishClient::new(
//!         RedfishConfig::new("192.168.0.120").with_credentials("root", "calvin"),
//!     )?;
//!
//!     let report = start_polling(
//!         &client,
//!         "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_123456789012",
//!         1200,
//!         10,
//!         OverrideTable::new(),
//!     )
//!     .await?;
//!
//!     println!("{}: {}", report.outcome.label(), report.elapsed_secs());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Error handling
    pub use crate::error::{Error, Result, TransportError};

    // Job tracking core
    pub use crate::jobs::{
        start_polling, Classification, JobPhase, JobReference, JobReport, JobStateClassifier,
        JobStateDocument, JobStatusFetcher, Outcome, OutcomeKind, OverrideTable, PollBudget,
        PollingLoop, ProjectedResult, ProjectionPolicy, ResultProjector, StateLocator,
    };

    // Redfish transport
    pub use crate::redfish::{
        AsyncOperation, JobTracker, RedfishClient, RedfishConfig, Submission, Tracked,
    };

    // Module system
    pub use crate::modules::{Module, ModuleContext, ModuleOutput, ModuleRegistry, ModuleResult};

    // Configuration
    pub use crate::config::Config;
}

/// Error types and result aliases.
///
/// [`TransportError`](error::TransportError) covers everything that can go
/// wrong talking to a controller; [`Error`](error::Error) adds tracking and
/// configuration failures on top.
pub mod error;

/// Job references, state documents, classification, polling and projection.
pub mod jobs;

/// Redfish HTTP client and the submit-then-track workflow.
pub mod redfish;

/// Parameter-driven modules and their registry.
pub mod modules;

/// Configuration loaded from files and environment.
pub mod config;

/// Tracing subscriber setup.
pub mod logging;

pub use error::{Error, Result};
