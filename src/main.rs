//! OpenManage - Redfish job tracking for Dell iDRAC and OpenManage Enterprise
//!
//! This is the main entry point for the OpenManage CLI.

mod cli;

use anyhow::Result;
use cli::commands::CommandContext;
use cli::Cli;
use openmanage::config::Config;
use openmanage::logging::init_logging;
use tracing::{debug, warn};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let mut config = Config::load(cli.config.as_ref())?;
    if cli.no_color {
        config.logging.ansi = false;
    }

    init_logging(&config.logging, cli.verbosity())?;
    debug!(version = VERSION, "Starting openmanage");

    let ctx = CommandContext::new(&cli, config);

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping job wait");
            cancel.cancel();
        }
    });

    let exit_code = ctx.execute(&cli).await?;

    std::process::exit(exit_code);
}
