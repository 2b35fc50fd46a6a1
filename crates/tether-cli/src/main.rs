//! Tether CLI application
//!
//! ```bash
//! tether supervise --config tether.toml
//! tether gateway --config tether.toml
//! tether check-config --config tether.toml
//! ```
//!
//! Logs go to stderr so `gateway` can use stdout for protocol messages.

mod args;
mod commands;
mod logging;
mod signal_handler;

use args::{Cli, Commands};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = commands::load_config(cli.config.as_deref())?;
    if let Some(level) = cli.requested_level() {
        config.logging.level = level.to_string();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    logging::init(&config.logging);

    match cli.command {
        Commands::Supervise => commands::supervise::run(config).await,
        Commands::Gateway => commands::gateway::run(config).await,
        Commands::CheckConfig => commands::check_config::run(&config),
    }
}
