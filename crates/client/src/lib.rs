//! nioftp client: one blocking session per [`Client`], one request at a time.

mod config;
mod processor;
mod session;

pub use config::ClientConfig;
pub use processor::RemoteEntry;
pub use session::Client;

use nioftp_protocol::{ErrorKind, ProtocolError};

/// Errors returned by [`Client`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("remote I/O failure: {0}")]
    RemoteIo(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),
}

impl ClientError {
    /// Maps an `ErrorResponse` from the server.
    pub fn from_remote(kind: ErrorKind, detail: String) -> Self {
        match kind {
            ErrorKind::NotFound => ClientError::NotFound(detail),
            ErrorKind::NotADirectory => ClientError::NotADirectory(detail),
            ErrorKind::AccessDenied => ClientError::AccessDenied(detail),
            ErrorKind::IoFailure => ClientError::RemoteIo(detail),
        }
    }

    /// Returns `true` if the server answered with an error and the session is
    /// still usable.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ClientError::NotFound(_)
                | ClientError::NotADirectory(_)
                | ClientError::AccessDenied(_)
                | ClientError::RemoteIo(_)
        )
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => ClientError::Io(e),
            other => ClientError::Protocol(other),
        }
    }
}
