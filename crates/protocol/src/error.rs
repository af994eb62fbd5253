//! Connection-fatal errors.

use crate::codec::CodecError;

/// Errors that end a connection.
///
/// Everything here is fatal: the caller closes the socket and discards the
/// connection state. Filesystem failures that the peer should hear about are
/// not errors at this level; they travel as [`Message::Error`](crate::Message::Error).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed payload: {0}")]
    Codec(#[from] CodecError),

    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("connection closed in the middle of a frame")]
    TruncatedFrame,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),

    #[error("protocol violation: {0}")]
    Violation(String),
}

impl ProtocolError {
    /// Returns `true` if the error came from the transport rather than from
    /// the peer breaking the protocol.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_) | ProtocolError::TruncatedFrame | ProtocolError::ConnectionClosed
        )
    }
}
