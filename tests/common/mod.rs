//! Shared test utilities for the OpenManage test suite.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use openmanage::error::TransportError;
use openmanage::jobs::JobStatusFetcher;

pub const JOB_URI: &str = "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_123456789012";

/// A job resource body as iDRAC returns it.
pub fn job_body(state: &str, message_id: Option<&str>, message: Option<&str>) -> Value {
    let mut body = json!({
        "@odata.context": "/redfish/v1/$metadata#DellJob.DellJob",
        "@odata.id": JOB_URI,
        "@odata.type": "#DellJob.v1_4_0.DellJob",
        "Id": "JID_123456789012",
        "JobState": state,
        "JobType": "BIOSConfiguration",
        "PercentComplete": if state == "Completed" { 100 } else { 50 },
    });
    if let Some(id) = message_id {
        body["MessageId"] = json!(id);
    }
    if let Some(msg) = message {
        body["Message"] = json!(msg);
    }
    body
}

/// Replays scripted responses in order, repeating the last one forever.
pub struct ScriptedFetcher {
    script: Vec<Result<Value, TransportError>>,
    calls: AtomicU32,
    seen: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<Value, TransportError>>) -> Self {
        assert!(!script.is_empty(), "script needs at least one response");
        Self {
            script,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// One body per poll, by job state.
    pub fn states(states: &[&str]) -> Self {
        Self::new(states.iter().map(|s| Ok(job_body(s, None, None))).collect())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Instants of each fetch, in order.
    pub fn fetch_times(&self) -> Vec<Instant> {
        self.seen.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn uris(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(uri, _)| uri.clone()).collect()
    }
}

#[async_trait]
impl JobStatusFetcher for ScriptedFetcher {
    async fn fetch(&self, tracking_uri: &str) -> Result<Value, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        self.seen
            .lock()
            .unwrap()
            .push((tracking_uri.to_string(), Instant::now()));
        let index = call.min(self.script.len() - 1);
        self.script[index].clone()
    }
}

/// Connection reset while reading the job.
pub fn connection_reset() -> TransportError {
    TransportError::Unreachable {
        url: format!("https://192.0.2.10{}", JOB_URI),
        message: "connection reset by peer".to_string(),
    }
}
