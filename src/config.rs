//! Configuration for OpenManage.
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/openmanage/openmanage.toml)
//! - User configuration (~/.openmanage.toml)
//! - Project configuration (./openmanage.toml)
//! - An explicit file (`--config` or `OPENMANAGE_CONFIG`)
//! - Environment variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::jobs::{OutcomeKind, OverrideTable, PartialPolicy, ProjectionPolicy, TimeoutPolicy};
use crate::logging::LoggingConfig;
use crate::redfish::{DEFAULT_PORT, DEFAULT_TIMEOUT};

/// Default `job_wait_timeout`, in seconds.
pub const DEFAULT_JOB_WAIT_TIMEOUT: i64 = 1200;

/// Default delay between job polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Job tracking defaults
    pub jobs: JobsConfig,

    /// Controller connection defaults
    pub connection: ConnectionConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Job tracking defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Maximum seconds to wait for a job
    pub job_wait_timeout: i64,

    /// Delay between polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How `CompletedWithErrors` is reported
    pub partial_policy: PartialPolicy,

    /// How an exhausted wait budget is reported
    pub timeout_policy: TimeoutPolicy,

    /// Message-id prefix to forced outcome
    pub message_overrides: BTreeMap<String, String>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            job_wait_timeout: DEFAULT_JOB_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            partial_policy: PartialPolicy::default(),
            timeout_policy: TimeoutPolicy::default(),
            message_overrides: BTreeMap::new(),
        }
    }
}

impl JobsConfig {
    /// The projection policy these settings describe.
    pub fn projection_policy(&self) -> ProjectionPolicy {
        ProjectionPolicy {
            partial: self.partial_policy,
            timeout: self.timeout_policy,
        }
    }
}

/// Controller connection defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// HTTPS port
    pub port: u16,

    /// Verify TLS certificates
    pub validate_certs: bool,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Template for job URIs, containing `{job_id}`
    pub job_uri_template: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            validate_certs: true,
            timeout: DEFAULT_TIMEOUT,
            job_uri_template: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Get the list of configuration file paths to check, lowest precedence first
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/openmanage/openmanage.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".openmanage.toml"));
        }

        paths.push(PathBuf::from("openmanage.toml"));

        if let Some(path) = explicit_path {
            paths.push(path.clone());
        } else if let Ok(env_config) = std::env::var("OPENMANAGE_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            "toml" => toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            _ => toml::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; values that differ from the defaults win
    fn merge(&self, other: Config) -> Config {
        let jobs_default = JobsConfig::default();
        let conn_default = ConnectionConfig::default();

        Config {
            jobs: JobsConfig {
                job_wait_timeout: if other.jobs.job_wait_timeout != jobs_default.job_wait_timeout {
                    other.jobs.job_wait_timeout
                } else {
                    self.jobs.job_wait_timeout
                },
                poll_interval: if other.jobs.poll_interval != jobs_default.poll_interval {
                    other.jobs.poll_interval
                } else {
                    self.jobs.poll_interval
                },
                partial_policy: if other.jobs.partial_policy != jobs_default.partial_policy {
                    other.jobs.partial_policy
                } else {
                    self.jobs.partial_policy
                },
                timeout_policy: if other.jobs.timeout_policy != jobs_default.timeout_policy {
                    other.jobs.timeout_policy
                } else {
                    self.jobs.timeout_policy
                },
                message_overrides: {
                    let mut overrides = self.jobs.message_overrides.clone();
                    overrides.extend(other.jobs.message_overrides);
                    overrides
                },
            },
            connection: ConnectionConfig {
                port: if other.connection.port != conn_default.port {
                    other.connection.port
                } else {
                    self.connection.port
                },
                validate_certs: self.connection.validate_certs && other.connection.validate_certs,
                timeout: if other.connection.timeout != conn_default.timeout {
                    other.connection.timeout
                } else {
                    self.connection.timeout
                },
                job_uri_template: other
                    .connection
                    .job_uri_template
                    .or_else(|| self.connection.job_uri_template.clone()),
            },
            logging: if other.logging != LoggingConfig::default() {
                other.logging
            } else {
                self.logging.clone()
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // OPENMANAGE_JOB_WAIT_TIMEOUT
        if let Ok(timeout) = std::env::var("OPENMANAGE_JOB_WAIT_TIMEOUT") {
            self.jobs.job_wait_timeout = timeout
                .trim()
                .parse()
                .with_context(|| format!("OPENMANAGE_JOB_WAIT_TIMEOUT: '{}' is not an integer", timeout))?;
        }

        // OPENMANAGE_POLL_INTERVAL accepts "15" or "15s"
        if let Ok(interval) = std::env::var("OPENMANAGE_POLL_INTERVAL") {
            self.jobs.poll_interval = parse_duration(&interval)
                .with_context(|| format!("OPENMANAGE_POLL_INTERVAL: '{}' is not a duration", interval))?;
        }

        // OPENMANAGE_VALIDATE_CERTS
        if let Ok(validate) = std::env::var("OPENMANAGE_VALIDATE_CERTS") {
            self.connection.validate_certs = !matches!(
                validate.trim().to_lowercase().as_str(),
                "false" | "no" | "0" | "off"
            );
        }

        // OPENMANAGE_LOG_LEVEL
        if let Ok(level) = std::env::var("OPENMANAGE_LOG_LEVEL") {
            self.logging.level = level.parse()?;
        }

        // NO_COLOR
        if std::env::var("NO_COLOR").is_ok() {
            self.logging.ansi = false;
        }

        Ok(())
    }

    /// Reject settings that would fail later
    pub fn validate(&self) -> Result<()> {
        if self.jobs.job_wait_timeout <= 0 {
            anyhow::bail!(crate::jobs::NEGATIVE_OR_ZERO_TIMEOUT_MSG);
        }
        if self.jobs.poll_interval.is_zero() {
            anyhow::bail!("jobs.poll_interval must not be zero");
        }
        if let Some(template) = &self.connection.job_uri_template {
            if !template.contains(crate::jobs::JOB_ID_PLACEHOLDER) {
                anyhow::bail!(
                    "connection.job_uri_template must contain {}",
                    crate::jobs::JOB_ID_PLACEHOLDER
                );
            }
        }
        self.default_override_table()?;
        Ok(())
    }

    /// The configured message-id overrides
    pub fn default_override_table(&self) -> crate::error::Result<OverrideTable> {
        self.jobs
            .message_overrides
            .iter()
            .map(|(prefix, outcome)| {
                outcome
                    .parse::<OutcomeKind>()
                    .map(|kind| (prefix.clone(), kind))
                    .map_err(|_| {
                        crate::error::Error::invalid_config(
                            format!("jobs.message_overrides.{}", prefix),
                            format!("unknown outcome '{}'", outcome),
                        )
                    })
            })
            .collect()
    }

    /// Load from a specific file only, without other sources
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }
}

/// Parse `15`, `15s`, `2m` or `1h 30m`.
fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let parsed: humantime_serde::Serde<Duration> =
        serde_json::from_value(serde_json::Value::String(value.to_string()))?;
    Ok(parsed.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.jobs.job_wait_timeout, 1200);
        assert_eq!(config.jobs.poll_interval, Duration::from_secs(10));
        assert_eq!(config.jobs.partial_policy, PartialPolicy::Fail);
        assert_eq!(config.connection.port, 443);
        assert!(config.connection.validate_certs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_merge() {
        let base = Config::default();
        let mut other = Config::default();
        other.jobs.poll_interval = Duration::from_secs(30);
        other
            .jobs
            .message_overrides
            .insert("LIC018".to_string(), "skipped".to_string());

        let merged = base.merge(other);
        assert_eq!(merged.jobs.poll_interval, Duration::from_secs(30));
        assert_eq!(merged.jobs.job_wait_timeout, 1200);
        assert_eq!(merged.jobs.message_overrides.len(), 1);
    }

    #[test]
    fn test_default_override_table() {
        let mut config = Config::default();
        config
            .jobs
            .message_overrides
            .insert("SYS098".to_string(), "unchanged".to_string());
        let table = config.default_override_table().unwrap();
        assert_eq!(table.lookup("IDRAC.2.9.SYS098"), Some(("SYS098", OutcomeKind::Unchanged)));

        config
            .jobs
            .message_overrides
            .insert("RAC0".to_string(), "maybe".to_string());
        assert!(config.default_override_table().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("15").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("OPENMANAGE_POLL_INTERVAL", "3s");
        std::env::set_var("OPENMANAGE_VALIDATE_CERTS", "false");
        let mut config = Config::default();
        let result = config.apply_env_overrides();
        std::env::remove_var("OPENMANAGE_POLL_INTERVAL");
        std::env::remove_var("OPENMANAGE_VALIDATE_CERTS");

        result.unwrap();
        assert_eq!(config.jobs.poll_interval, Duration::from_secs(3));
        assert!(!config.connection.validate_certs);
    }
}
