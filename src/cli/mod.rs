//! CLI module for OpenManage
//!
//! This module provides the command-line interface: argument parsing and
//! translation of flags into module parameters.

pub mod commands;
pub mod output;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;

use openmanage::modules::ModuleParams;

/// OpenManage - track asynchronous jobs on Dell iDRAC and OpenManage Enterprise
#[derive(Parser, Debug, Clone)]
#[command(name = "openmanage")]
#[command(author = "OpenManage Contributors")]
#[command(version)]
#[command(about = "Submit, poll and classify Redfish jobs on iDRAC and OME", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run in check mode (report what would happen, submit nothing)
    #[arg(long = "check", global = true)]
    pub check_mode: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "OPENMANAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the current state of a job without waiting
    Status(StatusArgs),

    /// Wait for a job to reach a terminal state
    Wait(WaitArgs),

    /// Submit an action and track the job it creates
    Submit(SubmitArgs),
}

/// Controller connection flags
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Controller hostname, IP address or base URL
    #[arg(long, env = "OPENMANAGE_HOST")]
    pub host: String,

    /// HTTPS port
    #[arg(long)]
    pub port: Option<u16>,

    /// User name for basic authentication
    #[arg(short = 'u', long, env = "OPENMANAGE_USER")]
    pub user: Option<String>,

    /// Password for basic authentication
    #[arg(short = 'p', long, env = "OPENMANAGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Session token (X-Auth-Token), used instead of user/password
    #[arg(long, env = "OPENMANAGE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Skip TLS certificate validation
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub request_timeout: Option<u32>,
}

impl ConnectionArgs {
    fn write_params(&self, params: &mut ModuleParams) {
        params.insert("baseuri".to_string(), json!(self.host));
        if let Some(port) = self.port {
            params.insert("port".to_string(), json!(port));
        }
        if let Some(user) = &self.user {
            params.insert("username".to_string(), json!(user));
        }
        if let Some(password) = &self.password {
            params.insert("password".to_string(), json!(password));
        }
        if let Some(token) = &self.token {
            params.insert("x_auth_token".to_string(), json!(token));
        }
        if self.insecure {
            params.insert("validate_certs".to_string(), json!(false));
        }
        if let Some(timeout) = self.request_timeout {
            params.insert("timeout".to_string(), json!(timeout));
        }
    }
}

/// Which job to look at
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Job id (e.g. JID_123456789012) or job resource path
    pub job: String,

    /// Template for turning a job id into a path, containing {job_id}
    #[arg(long)]
    pub job_uri_template: Option<String>,

    /// Where the state lives: redfish, ome, or a dotted field path
    #[arg(long)]
    pub state_source: Option<String>,
}

impl JobArgs {
    fn write_params(&self, params: &mut ModuleParams) {
        let key = if self.job.contains('/') { "job_uri" } else { "job_id" };
        params.insert(key.to_string(), json!(self.job));
        if let Some(template) = &self.job_uri_template {
            params.insert("job_uri_template".to_string(), json!(template));
        }
        if let Some(source) = &self.state_source {
            params.insert("state_source".to_string(), json!(source));
        }
    }
}

/// How `CompletedWithErrors` is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PartialPolicyArg {
    Fail,
    Succeed,
}

/// How an exhausted wait budget is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TimeoutPolicyArg {
    Fail,
    Warn,
}

/// Polling flags
#[derive(Args, Debug, Clone)]
pub struct TrackingArgs {
    /// Maximum seconds to wait for the job
    #[arg(long = "timeout", value_name = "SECONDS", allow_negative_numbers = true)]
    pub job_wait_timeout: Option<i64>,

    /// Seconds between polls
    #[arg(long = "interval", value_name = "SECONDS", allow_negative_numbers = true)]
    pub poll_interval: Option<i64>,

    /// Force an outcome for a message id prefix (PREFIX=OUTCOME)
    #[arg(long = "override", value_name = "PREFIX=OUTCOME", action = clap::ArgAction::Append)]
    pub overrides: Vec<String>,

    /// How CompletedWithErrors is reported
    #[arg(long, value_enum)]
    pub partial_policy: Option<PartialPolicyArg>,

    /// How an exhausted wait is reported
    #[arg(long, value_enum)]
    pub timeout_policy: Option<TimeoutPolicyArg>,
}

impl TrackingArgs {
    fn write_params(&self, params: &mut ModuleParams) -> anyhow::Result<()> {
        if let Some(timeout) = self.job_wait_timeout {
            params.insert("job_wait_timeout".to_string(), json!(timeout));
        }
        if let Some(interval) = self.poll_interval {
            params.insert("poll_interval".to_string(), json!(interval));
        }
        if !self.overrides.is_empty() {
            let mut map = serde_json::Map::new();
            for entry in &self.overrides {
                let (prefix, outcome) = entry
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("--override expects PREFIX=OUTCOME, got '{}'", entry))?;
                map.insert(prefix.trim().to_string(), json!(outcome.trim()));
            }
            params.insert("message_overrides".to_string(), Value::Object(map));
        }
        if let Some(policy) = self.partial_policy {
            let name = match policy {
                PartialPolicyArg::Fail => "fail",
                PartialPolicyArg::Succeed => "succeed",
            };
            params.insert("partial_policy".to_string(), json!(name));
        }
        if let Some(policy) = self.timeout_policy {
            let name = match policy {
                TimeoutPolicyArg::Fail => "fail",
                TimeoutPolicyArg::Warn => "warn",
            };
            params.insert("timeout_policy".to_string(), json!(name));
        }
        Ok(())
    }
}

/// Arguments for the status command
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub job: JobArgs,
}

/// Arguments for the wait command
#[derive(Args, Debug, Clone)]
pub struct WaitArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub job: JobArgs,

    #[command(flatten)]
    pub tracking: TrackingArgs,
}

/// Arguments for the submit command
#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Action or settings resource path
    pub resource_uri: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "POST")]
    pub method: String,

    /// JSON payload, or @path to read it from a file
    #[arg(short = 'd', long)]
    pub body: Option<String>,

    /// Return once the job is created instead of waiting for it
    #[arg(long)]
    pub no_wait: bool,

    /// Template for the job's resource path, containing {job_id}
    #[arg(long)]
    pub job_uri_template: Option<String>,

    /// Where the state lives: redfish, ome, or a dotted field path
    #[arg(long)]
    pub state_source: Option<String>,

    #[command(flatten)]
    pub tracking: TrackingArgs,
}

impl Commands {
    /// Module implementing this command
    pub fn module_name(&self) -> &'static str {
        match self {
            Commands::Status(_) => "idrac_job_status_info",
            Commands::Wait(_) => "redfish_job_tracking",
            Commands::Submit(_) => "redfish_action",
        }
    }

    /// Module parameters for this command
    pub fn to_params(&self) -> anyhow::Result<ModuleParams> {
        let mut params = ModuleParams::new();
        match self {
            Commands::Status(args) => {
                args.connection.write_params(&mut params);
                args.job.write_params(&mut params);
            }
            Commands::Wait(args) => {
                args.connection.write_params(&mut params);
                args.job.write_params(&mut params);
                args.tracking.write_params(&mut params)?;
            }
            Commands::Submit(args) => {
                args.connection.write_params(&mut params);
                args.tracking.write_params(&mut params)?;
                params.insert("resource_uri".to_string(), json!(args.resource_uri));
                params.insert("method".to_string(), json!(args.method));
                if let Some(body) = &args.body {
                    params.insert("body".to_string(), parse_body(body)?);
                }
                if args.no_wait {
                    params.insert("job_wait".to_string(), json!(false));
                }
                if let Some(template) = &args.job_uri_template {
                    params.insert("job_uri_template".to_string(), json!(template));
                }
                if let Some(source) = &args.state_source {
                    params.insert("state_source".to_string(), json!(source));
                }
            }
        }
        Ok(params)
    }
}

fn parse_body(body: &str) -> anyhow::Result<Value> {
    use anyhow::Context;

    let text = match body.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read body file: {}", path))?,
        None => body.to_string(),
    };
    serde_json::from_str(&text).context("--body must be valid JSON")
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
