//! idrac_job_status_info - read the current state of one job
//!
//! # Parameters
//!
//! - `job_id`: Lifecycle Controller job id, e.g. `JID_123456789012`
//! - `job_uri`: Full job resource path, used instead of `job_id`
//! - `job_uri_template`: Where `job_id` lives (default: the iDRAC manager job collection)
//! - `state_source`: `redfish`, `ome`, or a dotted field path
//!
//! Plus the connection parameters (`idrac_ip`, `idrac_user`, ...).

use async_trait::async_trait;

use super::common::{
    client_from_params, job_from_params, locator_from_params, reject_unknown, snapshot_output,
};
use super::{Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult};
use crate::error::TransportError;
use crate::jobs::{fetch_document, strip_odata_map};

const PARAMS: &[&str] = &["job_id", "job_uri", "job_uri_template", "state_source"];

/// Module for reading a job once, without waiting
pub struct IdracJobStatusInfoModule;

#[async_trait]
impl Module for IdracJobStatusInfoModule {
    fn name(&self) -> &'static str {
        "idrac_job_status_info"
    }

    fn description(&self) -> &'static str {
        "Get the status of a Lifecycle Controller job"
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        reject_unknown(params, &[PARAMS])?;
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
        let client = client_from_params(params, &context.config)?;
        let job = job_from_params(params, &context.config)?;
        let locator = locator_from_params(params)?;

        match fetch_document(&client, job.tracking_uri(), &locator).await {
            Ok(mut document) => {
                strip_odata_map(&mut document.raw);
                Ok(snapshot_output(&job, &document, "Successfully fetched the job info"))
            }
            Err(TransportError::Status { status: 404, .. }) => {
                Ok(ModuleOutput::failed("Job ID is invalid.")
                    .with_data("job_id", serde_json::json!(job.job_id())))
            }
            Err(err) => Err(err.into()),
        }
    }
}
