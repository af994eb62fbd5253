//! Wire protocol for remote directory browsing and file download.
//!
//! Each message travels in its own length-prefixed frame over a TCP stream.
//! A connection carries one request at a time: the client sends a
//! `ListRequest` or `GetRequest` and the server answers with a
//! `ListResponse`, a `GetHeader` followed by `GetData` chunks, or an
//! `ErrorResponse`.
//!
//! # Wire format
//!
//! See [`frame`] for the framing and [`codec`] for the payload layout.

pub mod codec;
pub mod connection;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{CodecError, decode, encode};
pub use connection::{Connection, Processor, ReadProgress, WriteProgress};
pub use error::ProtocolError;
pub use message::{ErrorKind, Message};

/// Port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 23923;

/// Maximum size of one `GetData` chunk (2 KB).
pub const TRANSFER_UNIT: usize = 2048;

/// Largest frame payload a peer will accept (16 MB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// First byte of every payload.
pub const FORMAT_VERSION: u8 = 1;
