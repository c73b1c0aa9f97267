//! Redfish transport and operation orchestration.

pub mod client;
pub mod operation;

pub use client::{
    RedfishClient, RedfishConfig, RedfishResponse, AUTH_TOKEN_HEADER, DEFAULT_PORT,
    DEFAULT_TIMEOUT,
};
pub use operation::{ActionMethod, AsyncOperation, JobTracker, Submission, Tracked};
