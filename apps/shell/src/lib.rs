//! Interactive shells over the nioftp server and client.

pub mod config;
pub mod shell;

use tracing_subscriber::EnvFilter;

/// Installs the log subscriber. `RUST_LOG` overrides the `info` default.
/// Logs go to stderr so they do not interleave with command output.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
