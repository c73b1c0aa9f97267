//! Parameters shared by the job modules.
//!
//! Connection parameters accept both the Redfish names (`baseuri`,
//! `username`, `password`) and the iDRAC names (`idrac_ip`, `idrac_user`,
//! `idrac_password`). Anything left out falls back to [`Config`].

use serde_json::{json, Value};
use std::time::Duration;

use super::{ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult, ParamExt};
use crate::config::Config;
use crate::error::Error;
use crate::jobs::{
    JobReference, JobReport, JobStateClassifier, JobStateDocument, OutcomeKind, OverrideTable,
    PartialPolicy, PollBudget, PollSummary, ProjectionPolicy, ResultProjector, StateLocator,
    TimeoutPolicy,
};
use crate::redfish::{JobTracker, RedfishClient, RedfishConfig};

/// Job collection on iDRAC managers.
pub const IDRAC_JOB_URI_TEMPLATE: &str = "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/{job_id}";

/// Parameters every job module accepts.
pub const CONNECTION_PARAMS: &[&str] = &[
    "baseuri",
    "idrac_ip",
    "port",
    "idrac_port",
    "username",
    "idrac_user",
    "password",
    "idrac_password",
    "x_auth_token",
    "validate_certs",
    "timeout",
];

/// Parameters of the job-waiting modules.
pub const TRACKING_PARAMS: &[&str] = &[
    "job_wait",
    "job_wait_timeout",
    "poll_interval",
    "message_overrides",
    "partial_policy",
    "timeout_policy",
    "state_source",
    "job_uri_template",
];

/// Fail on any parameter not in `CONNECTION_PARAMS` or one of `accepted`.
pub fn reject_unknown(params: &ModuleParams, accepted: &[&[&str]]) -> ModuleResult<()> {
    let mut unknown: Vec<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|key| {
            !CONNECTION_PARAMS.contains(key) && !accepted.iter().any(|group| group.contains(key))
        })
        .collect();

    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort_unstable();
    Err(ModuleError::InvalidParameter(format!(
        "unsupported parameters: {}",
        unknown.join(", ")
    )))
}

/// Build connection settings from module parameters.
pub fn connection_from_params(params: &ModuleParams, config: &Config) -> ModuleResult<RedfishConfig> {
    let host = params
        .get_string_any(&["baseuri", "idrac_ip"])?
        .ok_or_else(|| ModuleError::MissingParameter("baseuri".to_string()))?;

    let port = match params.get_u32("port")?.or(params.get_u32("idrac_port")?) {
        Some(port) => u16::try_from(port)
            .map_err(|_| ModuleError::InvalidParameter(format!("port {} is out of range", port)))?,
        None => config.connection.port,
    };

    let mut redfish = RedfishConfig::new(host)
        .with_port(port)
        .with_validate_certs(
            params
                .get_bool("validate_certs")?
                .unwrap_or(config.connection.validate_certs),
        );

    if let Some(timeout) = params.get_u32("timeout")? {
        if timeout == 0 {
            return Err(ModuleError::InvalidParameter(
                "timeout must be greater than zero".to_string(),
            ));
        }
        redfish = redfish.with_timeout(Duration::from_secs(u64::from(timeout)));
    } else {
        redfish = redfish.with_timeout(config.connection.timeout);
    }

    if let Some(token) = params.get_string("x_auth_token")? {
        redfish = redfish.with_token(token);
    } else if let Some(user) = params.get_string_any(&["username", "idrac_user"])? {
        let password = params
            .get_string_any(&["password", "idrac_password"])?
            .ok_or_else(|| ModuleError::MissingParameter("password".to_string()))?;
        redfish = redfish.with_credentials(user, password);
    }

    Ok(redfish)
}

/// Build a client from module parameters.
pub fn client_from_params(params: &ModuleParams, config: &Config) -> ModuleResult<RedfishClient> {
    Ok(RedfishClient::new(connection_from_params(params, config)?)?)
}

/// `job_wait_timeout` and `poll_interval`, in seconds.
pub fn budget_from_params(params: &ModuleParams, config: &Config) -> ModuleResult<PollBudget> {
    let max_wait = params
        .get_i64("job_wait_timeout")?
        .unwrap_or(config.jobs.job_wait_timeout);
    let interval = params.get_i64("poll_interval")?.unwrap_or_else(|| {
        i64::try_from(config.jobs.poll_interval.as_secs())
            .unwrap_or(i64::MAX)
            .max(1)
    });

    PollBudget::new(max_wait, interval).map_err(|err| match err {
        Error::InvalidBudget(msg) => ModuleError::InvalidParameter(msg),
        other => ModuleError::Core(other),
    })
}

/// Configured overrides, extended by the `message_overrides` parameter.
pub fn overrides_from_params(params: &ModuleParams, config: &Config) -> ModuleResult<OverrideTable> {
    let mut table = config.default_override_table()?;

    if let Some(overrides) = params.get_object("message_overrides")? {
        for (prefix, outcome) in overrides {
            let outcome = outcome.as_str().ok_or_else(|| {
                ModuleError::InvalidParameter(format!(
                    "message_overrides.{} must be an outcome name",
                    prefix
                ))
            })?;
            let kind: OutcomeKind = outcome.parse().map_err(|_| {
                ModuleError::InvalidParameter(format!(
                    "message_overrides.{}: unknown outcome '{}'",
                    prefix, outcome
                ))
            })?;
            table.insert(prefix, kind);
        }
    }

    Ok(table)
}

/// `partial_policy` and `timeout_policy`.
pub fn policy_from_params(params: &ModuleParams, config: &Config) -> ModuleResult<ProjectionPolicy> {
    let mut policy = config.jobs.projection_policy();

    if let Some(partial) = params.get_string("partial_policy")? {
        policy.partial = match partial.to_lowercase().as_str() {
            "fail" => PartialPolicy::Fail,
            "succeed" => PartialPolicy::Succeed,
            other => {
                return Err(ModuleError::InvalidParameter(format!(
                    "partial_policy must be 'fail' or 'succeed', got '{}'",
                    other
                )))
            }
        };
    }

    if let Some(timeout) = params.get_string("timeout_policy")? {
        policy.timeout = match timeout.to_lowercase().as_str() {
            "fail" => TimeoutPolicy::Fail,
            "warn" => TimeoutPolicy::Warn,
            other => {
                return Err(ModuleError::InvalidParameter(format!(
                    "timeout_policy must be 'fail' or 'warn', got '{}'",
                    other
                )))
            }
        };
    }

    Ok(policy)
}

/// `state_source`: `redfish` (default), `ome`, or a dotted field path.
pub fn locator_from_params(params: &ModuleParams) -> ModuleResult<StateLocator> {
    let source = params
        .get_string("state_source")?
        .unwrap_or_else(|| "redfish".to_string());

    Ok(match source.to_lowercase().as_str() {
        "redfish" => StateLocator::Redfish,
        "ome" => StateLocator::Ome,
        _ if source.trim().is_empty() => {
            return Err(ModuleError::InvalidParameter(
                "state_source must not be empty".to_string(),
            ))
        }
        _ => StateLocator::field(source.trim()),
    })
}

/// The state table matching `locator`, with `overrides` applied.
pub fn classifier_for(locator: &StateLocator, overrides: OverrideTable) -> JobStateClassifier {
    match locator {
        StateLocator::Ome => JobStateClassifier::ome(overrides),
        _ => JobStateClassifier::redfish(overrides),
    }
}

/// `job_uri`, or `job_id` placed into `job_uri_template`.
pub fn job_from_params(params: &ModuleParams, config: &Config) -> ModuleResult<JobReference> {
    if let Some(uri) = params.get_string("job_uri")? {
        return Ok(JobReference::new(uri)?);
    }

    let job_id = params
        .get_string("job_id")?
        .ok_or_else(|| ModuleError::MissingParameter("job_id".to_string()))?;
    let template = job_uri_template(params, config)?.unwrap_or_else(|| IDRAC_JOB_URI_TEMPLATE.to_string());
    Ok(JobReference::from_job_id(&template, &job_id)?)
}

/// Explicit `job_uri_template` parameter, else the configured one.
pub fn job_uri_template(params: &ModuleParams, config: &Config) -> ModuleResult<Option<String>> {
    Ok(params
        .get_string("job_uri_template")?
        .or_else(|| config.connection.job_uri_template.clone()))
}

/// Assemble a tracker from module parameters.
pub fn tracker_from_params<'a>(
    client: &'a RedfishClient,
    params: &ModuleParams,
    context: &ModuleContext,
) -> ModuleResult<JobTracker<'a, RedfishClient>> {
    let config = &context.config;
    let overrides = overrides_from_params(params, config)?;
    let locator = locator_from_params(params)?;
    let classifier = classifier_for(&locator, overrides);
    let budget = budget_from_params(params, config)?;

    let mut tracker = JobTracker::new(client, classifier, budget).with_locator(locator);
    if let Some(token) = &context.cancel {
        tracker = tracker.with_cancellation(token.clone());
    }
    Ok(tracker)
}

/// Turn a finished polling session into module output.
pub fn report_output(report: &JobReport, policy: ProjectionPolicy) -> ModuleOutput {
    let projected = ResultProjector::new(policy).project(report);

    let output = if projected.failed {
        ModuleOutput::failed(projected.msg.clone())
    } else if projected.skipped {
        ModuleOutput::skipped(projected.msg.clone())
    } else if projected.changed {
        ModuleOutput::changed(projected.msg.clone())
    } else {
        ModuleOutput::ok(projected.msg.clone())
    };

    let summary = PollSummary::from(report);
    output
        .with_changed(projected.changed)
        .with_data("job_id", json!(summary.job_id))
        .with_data("job_details", projected.job_details)
        .with_data("elapsed_seconds", json!(summary.elapsed_seconds))
        .with_data("outcome", json!(summary.outcome))
        .with_data("polls", json!(summary.polls))
}

/// Report a cancelled wait as failed output; other errors pass through.
pub fn tracking_error_output(err: Error) -> ModuleResult<ModuleOutput> {
    match err {
        Error::Cancelled {
            job_id,
            elapsed_secs,
            last,
        } => {
            let msg = format!("Tracking of job '{}' cancelled after {} seconds.", job_id, elapsed_secs);
            Ok(ModuleOutput::failed(msg)
                .with_data("job_id", json!(job_id))
                .with_data("job_details", Value::Object(last.raw))
                .with_data("elapsed_seconds", json!(elapsed_secs))
                .with_data("outcome", json!("cancelled")))
        }
        other => Err(other.into()),
    }
}

/// Turn a single job read into module output.
pub fn snapshot_output(job: &JobReference, document: &JobStateDocument, msg: impl Into<String>) -> ModuleOutput {
    ModuleOutput::ok(msg)
        .with_data("job_id", json!(job.job_id()))
        .with_data("job_details", Value::Object(document.raw.clone()))
        .with_data("job_state", json!(document.job_state))
}
