//! Structured logging using the tracing crate.
//!
//! Log lines go to stderr so that `--output json` on stdout stays parseable.
//! `RUST_LOG` always wins over the configured level and filter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{Error, Result};

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including per-request traces
    Trace,
    /// Per-poll detail
    Debug,
    /// Job lifecycle
    Info,
    /// Timeouts, overrides and cancellations
    #[default]
    Warn,
    /// Errors only
    Error,
}

impl LogLevel {
    /// Map `-v` repetitions to a level.
    pub fn from_verbosity(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// The filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::invalid_config(
                "logging.level",
                format!("unknown log level '{}'", other),
            )),
        }
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human friendly
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level
    pub level: LogLevel,
    /// Output layout
    pub format: LogFormat,
    /// Extra filter directive, e.g. `openmanage=debug,reqwest=warn`
    pub filter: Option<String>,
    /// Colored output
    pub ansi: bool,
    /// Include the event target
    pub with_target: bool,
    /// Emit span open/close events
    pub with_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            filter: None,
            ansi: true,
            with_target: false,
            with_spans: false,
        }
    }
}

/// Builds and installs the global subscriber.
#[derive(Debug, Clone, Default)]
pub struct LoggingBuilder {
    config: LoggingConfig,
}

impl LoggingBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder from existing settings.
    pub fn from_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Set the level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Set the format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Enable or disable colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.config.ansi = enabled;
        self
    }

    /// Set a filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    /// The settings being built.
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    fn build_filter(&self) -> EnvFilter {
        let default_filter = self.config.level.as_str();

        EnvFilter::try_from_default_env()
            .or_else(|_| match &self.config.filter {
                Some(filter) => EnvFilter::try_new(filter),
                None => EnvFilter::try_new(default_filter),
            })
            .unwrap_or_else(|_| EnvFilter::new(default_filter))
    }

    fn span_events(&self) -> FmtSpan {
        if self.config.with_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    /// Build a layer that can be composed with other layers.
    pub fn build_layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
    {
        let filter = self.build_filter();
        let spans = self.span_events();

        match self.config.format {
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_ansi(self.config.ansi)
                .with_target(self.config.with_target)
                .with_span_events(spans)
                .with_filter(filter)
                .boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_ansi(self.config.ansi)
                .with_target(self.config.with_target)
                .with_span_events(spans)
                .with_filter(filter)
                .boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(self.config.with_spans)
                .with_span_list(self.config.with_spans)
                .with_target(self.config.with_target)
                .with_span_events(spans)
                .with_filter(filter)
                .boxed(),
        }
    }

    /// Install as the global subscriber.
    pub fn init(self) -> Result<()> {
        tracing_subscriber::registry()
            .with(self.build_layer())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
    }
}

/// Initialize logging from configuration, raised to at least the CLI verbosity.
pub fn init_logging(config: &LoggingConfig, verbosity: u8) -> Result<()> {
    let mut config = config.clone();
    if verbosity > 0 {
        let requested = LogLevel::from_verbosity(verbosity);
        if verbosity_rank(requested) > verbosity_rank(config.level) {
            config.level = requested;
        }
        config.with_target = config.with_target || verbosity >= 2;
    }
    LoggingBuilder::from_config(config).init()
}

fn verbosity_rank(level: LogLevel) -> u8 {
    match level {
        LogLevel::Error => 0,
        LogLevel::Warn => 1,
        LogLevel::Info => 2,
        LogLevel::Debug => 3,
        LogLevel::Trace => 4,
    }
}
