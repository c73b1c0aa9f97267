//! redfish_action - start an operation and follow the job it creates
//!
//! Sends one POST/PATCH/PUT/DELETE. A `202 Accepted` response names a job in
//! its `Location` header, which is then tracked like `redfish_job_tracking`
//! does. A synchronous 2xx is reported as changed.
//!
//! # Parameters
//!
//! - `resource_uri` (required): Action target, e.g.
//!   `/redfish/v1/Systems/System.Embedded.1/Actions/ComputerSystem.Reset`
//! - `method`: HTTP verb (default: POST)
//! - `body`: JSON object payload
//!
//! Plus the connection and tracking parameters.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::common::{
    client_from_params, job_uri_template, policy_from_params, reject_unknown, report_output,
    tracker_from_params, tracking_error_output, TRACKING_PARAMS,
};
use super::{Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult, ParamExt};
use crate::jobs::strip_odata;
use crate::redfish::{ActionMethod, AsyncOperation, Tracked};

const PARAMS: &[&str] = &["resource_uri", "method", "body"];

/// Message for check mode.
pub const CHANGES_FOUND_MSG: &str = "Changes found to be applied.";

/// Message when the job is left running.
pub const JOB_SUBMITTED_MSG: &str = "The job is submitted successfully.";

/// Module for submitting controller actions
pub struct RedfishActionModule;

impl RedfishActionModule {
    fn operation(params: &ModuleParams) -> ModuleResult<AsyncOperation> {
        let path = params.get_string_required("resource_uri")?;
        let method = match params.get_string("method")? {
            Some(method) => ActionMethod::parse(&method).ok_or_else(|| {
                ModuleError::InvalidParameter(format!(
                    "Invalid method: {}. Supported: POST, PATCH, PUT, DELETE",
                    method
                ))
            })?,
            None => ActionMethod::Post,
        };
        let body = params.get_object("body")?.map(Value::Object);

        Ok(AsyncOperation { method, path, body })
    }
}

#[async_trait]
impl Module for RedfishActionModule {
    fn name(&self) -> &'static str {
        "redfish_action"
    }

    fn description(&self) -> &'static str {
        "Submit a Redfish action and track the resulting job"
    }

    fn required_params(&self) -> &[&'static str] {
        &["resource_uri"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        reject_unknown(params, &[PARAMS, TRACKING_PARAMS])?;
        Self::operation(params).map(|_| ())
    }

    async fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let operation = Self::operation(params)?;

        if context.check_mode {
            return Ok(ModuleOutput::changed(CHANGES_FOUND_MSG)
                .with_data("method", json!(operation.method))
                .with_data("resource_uri", json!(operation.path)));
        }

        let config = &context.config;
        let policy = policy_from_params(params, config)?;
        let client = client_from_params(params, config)?;
        let tracker = tracker_from_params(&client, params, context)?
            .with_job_uri_template(job_uri_template(params, config)?);
        let wait = params.get_bool("job_wait")?.unwrap_or(true);

        let submission = client.submit(&operation).await?;
        let tracked = match tracker.follow(submission, wait).await {
            Ok(tracked) => tracked,
            Err(err) => return tracking_error_output(err),
        };

        Ok(match tracked {
            Tracked::Immediate(response) => {
                let mut body = response.body;
                strip_odata(&mut body);
                ModuleOutput::changed("Successfully performed the action.")
                    .with_data("status_code", json!(response.status))
                    .with_data("response", body)
            }
            Tracked::Finished(report) => report_output(&report, policy),
            Tracked::Snapshot { job, document } => ModuleOutput::changed(JOB_SUBMITTED_MSG)
                .with_data("job_id", json!(job.job_id()))
                .with_data("job_details", Value::Object(document.raw))
                .with_data("outcome", json!("submitted")),
        })
    }
}
