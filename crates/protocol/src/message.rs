//! The closed set of messages exchanged over a connection.

use std::fmt;

/// Kind of a filesystem failure reported to the peer in an [`Message::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    NotADirectory,
    AccessDenied,
    IoFailure,
}

impl ErrorKind {
    /// Wire code of this kind.
    pub fn code(self) -> u8 {
        match self {
            ErrorKind::NotFound => 1,
            ErrorKind::NotADirectory => 2,
            ErrorKind::AccessDenied => 3,
            ErrorKind::IoFailure => 4,
        }
    }

    /// Parses a wire code, returning `None` for unknown codes.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ErrorKind::NotFound),
            2 => Some(ErrorKind::NotADirectory),
            3 => Some(ErrorKind::AccessDenied),
            4 => Some(ErrorKind::IoFailure),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::NotADirectory => "not a directory",
            ErrorKind::AccessDenied => "access denied",
            ErrorKind::IoFailure => "I/O failure",
        };
        f.write_str(s)
    }
}

/// A protocol message. Exactly one message travels in each frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Asks for the direct children of a directory.
    ListRequest { path: String },
    /// Names of the children of the requested directory, split by type.
    ListResponse {
        directories: Vec<String>,
        files: Vec<String>,
    },
    /// Asks for the contents of a regular file.
    GetRequest { path: String },
    /// Precedes the data chunks of a download.
    GetHeader { path: String, size: u64 },
    /// One chunk of file contents, at most one transfer unit long.
    GetData { bytes: Vec<u8> },
    /// Terminates the current request with a failure.
    Error { kind: ErrorKind, detail: String },
}

impl Message {
    /// Short name of the message kind, for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Message::ListRequest { .. } => "ListRequest",
            Message::ListResponse { .. } => "ListResponse",
            Message::GetRequest { .. } => "GetRequest",
            Message::GetHeader { .. } => "GetHeader",
            Message::GetData { .. } => "GetData",
            Message::Error { .. } => "ErrorResponse",
        }
    }

    /// Returns `true` for messages a client sends.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Message::ListRequest { .. } | Message::GetRequest { .. }
        )
    }

    /// Builds an error response.
    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Message::Error {
            kind,
            detail: detail.into(),
        }
    }
}
