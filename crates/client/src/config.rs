//! Client configuration.

use serde::{Deserialize, Serialize};

use nioftp_protocol::{DEFAULT_PORT, MAX_FRAME_LEN};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Port used when the address passed to `connect` has none.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest incoming frame payload accepted from the server.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_frame_len() -> usize {
    MAX_FRAME_LEN
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.port, 23923);
    }

    #[test]
    fn port_override() {
        let config: ClientConfig = toml::from_str("port = 4000").unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.max_frame_len, MAX_FRAME_LEN);
    }
}
