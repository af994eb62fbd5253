//! nioftp server: serves one directory tree to many clients from a single
//! non-blocking event loop.

mod browse;
mod config;
mod event_loop;
mod processor;
mod sandbox;
mod server;

use std::path::PathBuf;

pub use browse::{Listing, list_directory};
pub use config::ServerConfig;
pub use processor::{Interest, ServerProcessor};
pub use sandbox::{SandboxError, SandboxRoot};
pub use server::Server;

/// Errors returned by [`Server::start`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server already started")]
    AlreadyStarted,

    #[error("invalid root directory {}: {source}", path.display())]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resolve bind address: {0}")]
    InvalidBindAddress(String),
}
