//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use nioftp_protocol::{DEFAULT_PORT, MAX_FRAME_LEN, TRANSFER_UNIT};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// TCP port to listen on (0 = OS-assigned).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum bytes per `GetData` chunk.
    #[serde(default = "default_transfer_unit")]
    pub transfer_unit: usize,

    /// Largest incoming frame payload accepted from a client.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    /// How long `stop` waits for the event loop before escalating.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Readiness events handled per poll iteration.
    #[serde(default = "default_events_capacity")]
    pub events_capacity: usize,
}

fn default_bind_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_transfer_unit() -> usize {
    TRANSFER_UNIT
}

fn default_max_frame_len() -> usize {
    MAX_FRAME_LEN
}

fn default_stop_grace_ms() -> u64 {
    1000
}

fn default_events_capacity() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            port: default_port(),
            transfer_unit: default_transfer_unit(),
            max_frame_len: default_max_frame_len(),
            stop_grace_ms: default_stop_grace_ms(),
            events_capacity: default_events_capacity(),
        }
    }
}

impl ServerConfig {
    /// Loopback-only configuration on an OS-assigned port.
    pub fn ephemeral() -> Self {
        Self {
            bind_host: "127.0.0.1".into(),
            port: 0,
            ..Self::default()
        }
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
