//! Subcommand implementations

pub mod check_config;
pub mod gateway;
pub mod supervise;

use anyhow::Context;
use std::path::Path;
use tether_core::{ConfigLoader, TetherConfig};

/// Defaults, then the file if one was given, then `TETHER_*` overrides
pub fn load_config(path: Option<&Path>) -> anyhow::Result<TetherConfig> {
    let mut loader = ConfigLoader::new().with_defaults();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader
        .with_env()
        .load()
        .with_context(|| match path {
            Some(path) => format!("loading configuration from {}", path.display()),
            None => "loading default configuration".to_string(),
        })
}
