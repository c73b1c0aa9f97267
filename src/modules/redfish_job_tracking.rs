//! redfish_job_tracking - wait for an existing job to finish
//!
//! # Parameters
//!
//! - `job_id` / `job_uri`: The job to follow
//! - `job_wait`: Wait for a terminal state (default: true)
//! - `job_wait_timeout`: Seconds to wait (default: `jobs.job_wait_timeout`)
//! - `poll_interval`: Seconds between polls (default: `jobs.poll_interval`)
//! - `message_overrides`: Map of message-id prefix to outcome
//! - `partial_policy`: `fail` or `succeed` for `CompletedWithErrors`
//! - `timeout_policy`: `fail` or `warn` when the wait runs out
//! - `state_source`: `redfish`, `ome`, or a dotted field path
//! - `job_uri_template`: Poll jobs under this template instead of their URI

use async_trait::async_trait;

use super::common::{
    client_from_params, job_from_params, job_uri_template, policy_from_params, reject_unknown,
    report_output, snapshot_output, tracker_from_params, tracking_error_output, TRACKING_PARAMS,
};
use super::{Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult, ParamExt};

const PARAMS: &[&str] = &["job_id", "job_uri"];

/// Module for following a job to completion
pub struct RedfishJobTrackingModule;

#[async_trait]
impl Module for RedfishJobTrackingModule {
    fn name(&self) -> &'static str {
        "redfish_job_tracking"
    }

    fn description(&self) -> &'static str {
        "Track a Redfish job until it completes, fails or the wait budget runs out"
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        reject_unknown(params, &[PARAMS, TRACKING_PARAMS])?;
        if !params.contains_key("job_id") && !params.contains_key("job_uri") {
            return Err(ModuleError::MissingParameter("job_id".to_string()));
        }
        Ok(())
    }

    async fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = &context.config;
        let policy = policy_from_params(params, config)?;
        let client = client_from_params(params, config)?;
        let job = job_from_params(params, config)?;
        let tracker = tracker_from_params(&client, params, context)?
            .with_job_uri_template(job_uri_template(params, config)?);

        let wait = params.get_bool("job_wait")?.unwrap_or(true);
        if context.check_mode || !wait {
            let document = tracker.snapshot(&job).await?;
            let msg = format!("Job {} is in {} state.", job.job_id(), document.job_state);
            return Ok(snapshot_output(&job, &document, msg));
        }

        match tracker.track(&job).await {
            Ok(report) => Ok(report_output(&report, policy)),
            Err(err) => tracking_error_output(err),
        }
    }
}
