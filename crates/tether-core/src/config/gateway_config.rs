//! Tool gateway configuration

use super::defaults::gateway as defaults;
use serde::{Deserialize, Serialize};

fn default_server_name() -> String {
    defaults::SERVER_NAME.to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_protocol_version() -> String {
    defaults::PROTOCOL_VERSION.to_string()
}

/// Identity reported by the gateway during the `initialize` handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_server_version")]
    pub server_version: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            server_version: default_server_version(),
            protocol_version: default_protocol_version(),
        }
    }
}
