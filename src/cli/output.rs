//! Output formatting for the CLI

use colored::Colorize;
use serde_json::{json, Value};
use std::io::{self, Write};

use super::OutputFormat;
use openmanage::modules::{ModuleOutput, ModuleStatus};

/// Exit code for failed jobs and rejected input.
pub const EXIT_FAILED: i32 = 2;

/// Exit code when the controller cannot be reached.
pub const EXIT_UNREACHABLE: i32 = 3;

/// Process exit code for a module result.
pub fn exit_code(status: ModuleStatus) -> i32 {
    match status {
        ModuleStatus::Ok | ModuleStatus::Changed | ModuleStatus::Skipped => 0,
        ModuleStatus::Failed => EXIT_FAILED,
        ModuleStatus::Unreachable => EXIT_UNREACHABLE,
    }
}

fn status_label(status: ModuleStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        ModuleStatus::Ok => label.green(),
        ModuleStatus::Changed => label.yellow(),
        ModuleStatus::Skipped => label.cyan(),
        ModuleStatus::Failed | ModuleStatus::Unreachable => label.red().bold(),
    }
}

/// Writes module results to stdout
pub struct OutputFormatter {
    format: OutputFormat,
    verbosity: u8,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, use_color: bool, verbosity: u8) -> Self {
        if !use_color {
            colored::control::set_override(false);
        }
        Self { format, verbosity }
    }

    /// Render a module result
    pub fn render(&self, output: &ModuleOutput) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(output).unwrap_or_default(),
            OutputFormat::Human => self.render_human(output),
        }
    }

    /// Render an error that kept the module from producing a result
    pub fn render_error(&self, error: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&json!({"status": "failed", "msg": error}))
                    .unwrap_or_default()
            }
            OutputFormat::Human => format!("{}: {}", "error".red().bold(), error),
        }
    }

    fn render_human(&self, output: &ModuleOutput) -> String {
        let mut lines = vec![format!("{}: {}", status_label(output.status), output.msg)];

        for key in ["job_id", "job_state", "outcome", "elapsed_seconds", "status_code"] {
            if let Some(value) = output.data.get(key) {
                lines.push(format!("  {}: {}", key.dimmed(), plain(value)));
            }
        }

        if self.verbosity > 0 {
            for key in ["job_details", "response"] {
                if let Some(value) = output.data.get(key) {
                    let pretty = serde_json::to_string_pretty(value).unwrap_or_default();
                    lines.push(format!("  {}:", key.dimmed()));
                    lines.extend(pretty.lines().map(|line| format!("    {}", line)));
                }
            }
        }

        lines.join("\n")
    }

    /// Print a module result
    pub fn print(&self, output: &ModuleOutput) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", self.render(output))
    }

    /// Print an error
    pub fn print_error(&self, error: &str) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => writeln!(io::stdout().lock(), "{}", self.render_error(error)),
            OutputFormat::Human => writeln!(io::stderr().lock(), "{}", self.render_error(error)),
        }
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
