//! Process configuration: a single required environment variable. There is
//! no config file here — the entire runtime surface this node needs from
//! its environment is its own externally reachable address.

use std::env;

pub const LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    /// This node's externally reachable `host:port`, compared against view
    /// `nodes` entries to determine membership and self-shard (§6).
    pub self_addr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ADDRESS environment variable is required")]
    MissingAddress,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let self_addr = env::var("ADDRESS").map_err(|_| ConfigError::MissingAddress)?;
        Ok(Config { self_addr })
    }
}
