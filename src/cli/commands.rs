//! Subcommand execution
//!
//! Every subcommand maps onto one module; the CLI only translates flags into
//! module parameters and renders the result.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::output::{exit_code, OutputFormatter, EXIT_FAILED};
use super::Cli;
use openmanage::config::Config;
use openmanage::modules::{ModuleContext, ModuleRegistry};

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Arc<Config>,
    /// Output formatter
    pub output: OutputFormatter,
    /// Check mode (dry-run)
    pub check_mode: bool,
    /// Cancelled on Ctrl-C
    pub cancel: CancellationToken,
    /// Available modules
    pub registry: ModuleRegistry,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli, config: Config) -> Self {
        let use_color = !cli.no_color && config.logging.ansi;
        Self {
            output: OutputFormatter::new(cli.output, use_color, cli.verbosity()),
            config: Arc::new(config),
            check_mode: cli.check_mode,
            cancel: CancellationToken::new(),
            registry: ModuleRegistry::with_builtins(),
        }
    }

    fn module_context(&self) -> ModuleContext {
        ModuleContext::new()
            .with_check_mode(self.check_mode)
            .with_config(Arc::clone(&self.config))
            .with_cancellation(self.cancel.clone())
    }

    /// Run the selected subcommand and return the process exit code
    pub async fn execute(&self, cli: &Cli) -> Result<i32> {
        let module = cli.command.module_name();
        let params = match cli.command.to_params() {
            Ok(params) => params,
            Err(err) => {
                self.output.print_error(&format!("{:#}", err))?;
                return Ok(EXIT_FAILED);
            }
        };

        debug!(module, check_mode = self.check_mode, "Executing module");

        match self
            .registry
            .execute(module, &params, &self.module_context())
            .await
        {
            Ok(output) => {
                self.output.print(&output)?;
                Ok(exit_code(output.status))
            }
            Err(err) => {
                self.output.print_error(&err.to_string())?;
                Ok(EXIT_FAILED)
            }
        }
    }
}
