//! CLI argument definitions using clap
//!
//! - tether supervise             # run every configured tool server
//! - tether gateway               # JSON-RPC on stdin/stdout, tools run on the renderer
//! - tether check-config          # validate and print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tether_core::config::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Supervise tool servers and a renderer over line-delimited JSON")]
#[command(version)]
pub struct Cli {
    /// Configuration file (.toml, .json, .yaml)
    #[arg(long, short, global = true, env = "TETHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,

    /// Shorthand for --log-level debug
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Start every enabled process and keep them running until interrupted
    Supervise,

    /// Serve the tool gateway on stdin/stdout
    Gateway,

    /// Load and validate the configuration, then print it as JSON
    CheckConfig,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse().map_err(|e: tether_core::TetherError| e.to_string())
}

impl Cli {
    /// Level requested on the command line, if any
    pub fn requested_level(&self) -> Option<&str> {
        if self.verbose {
            Some("debug")
        } else {
            self.log_level.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gateway_with_globals() {
        let cli = Cli::try_parse_from([
            "tether",
            "gateway",
            "--config",
            "tether.toml",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.command, Commands::Gateway);
        assert_eq!(cli.config, Some(PathBuf::from("tether.toml")));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn test_verbose_overrides_level() {
        let cli = Cli::try_parse_from(["tether", "-v", "--log-level", "warn", "supervise"]).unwrap();
        assert_eq!(cli.requested_level(), Some("debug"));
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["tether", "check-config", "--log-format", "xml"]).is_err());
    }
}
