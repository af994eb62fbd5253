//! Shell configuration file.
//!
//! Optional TOML with one table per side:
//!
//! ```toml
//! [server]
//! port = 23923
//! transfer_unit = 2048
//!
//! [client]
//! port = 23923
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use nioftp_client::ClientConfig;
use nioftp_server::ServerConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

impl ShellConfig {
    /// Loads `path`, or returns defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        let config: ShellConfig = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}
