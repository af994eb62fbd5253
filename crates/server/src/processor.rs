//! Per-connection request handling.
//!
//! ```text
//!            ListRequest / failed GetRequest
//!   Idle ─────────────────────────────────────▶ AwaitingWrite
//!    ▲  │                                            │
//!    │  │ GetRequest                                 │ response drained
//!    │  ▼                                            │
//!    │ Sending ── header, chunks … ── EOF ───────────┤
//!    └───────────────────────────────────────────────┘
//! ```
//!
//! The processor decides which readiness the socket should wait for
//! ([`ServerProcessor::interest`]); the event loop only applies it.

use std::fs::File;
use std::io::Read;
use std::sync::Arc;

use tracing::{debug, warn};

use nioftp_protocol::{Message, Processor, ProtocolError};

use crate::browse::list_directory;
use crate::sandbox::{SandboxError, SandboxRoot};

/// Readiness a connection waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

/// An open download.
#[derive(Debug)]
struct Transfer {
    file: File,
    path: String,
    size: u64,
    sent: u64,
    header: Option<Message>,
}

#[derive(Debug)]
enum State {
    Idle,
    /// A single response is queued; `None` once handed to the engine.
    AwaitingWrite(Option<Message>),
    Sending(Transfer),
}

/// Request handler for one client connection.
#[derive(Debug)]
pub struct ServerProcessor {
    root: Arc<SandboxRoot>,
    transfer_unit: usize,
    state: State,
}

impl ServerProcessor {
    pub fn new(root: Arc<SandboxRoot>, transfer_unit: usize) -> Self {
        Self {
            root,
            transfer_unit: transfer_unit.max(1),
            state: State::Idle,
        }
    }

    /// Readiness the connection should be registered for in its current state.
    pub fn interest(&self) -> Interest {
        match self.state {
            State::Idle => Interest::Readable,
            State::AwaitingWrite(_) | State::Sending(_) => Interest::Writable,
        }
    }

    /// Returns `true` if no request is in progress.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    fn handle_list(&self, path: &str) -> Message {
        let listing = self
            .root
            .resolve_dir(path)
            .and_then(|dir| list_directory(&dir).map_err(|e| SandboxError::from_io(path, e)));

        match listing {
            Ok(listing) => {
                debug!(
                    path,
                    directories = listing.directories.len(),
                    files = listing.files.len(),
                    "list"
                );
                Message::ListResponse {
                    directories: listing.directories,
                    files: listing.files,
                }
            }
            Err(e) => error_response(e),
        }
    }

    fn open_transfer(&self, path: &str) -> Result<Transfer, SandboxError> {
        let resolved = self.root.resolve_file(path)?;
        let file = File::open(&resolved).map_err(|e| SandboxError::from_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| SandboxError::from_io(path, e))?
            .len();

        debug!(path, size, "get");
        Ok(Transfer {
            file,
            path: path.to_owned(),
            size,
            sent: 0,
            header: Some(Message::GetHeader {
                path: path.to_owned(),
                size,
            }),
        })
    }

    /// Produces the next chunk of the open transfer, or `None` once the
    /// declared size has been sent.
    fn next_chunk(transfer: &mut Transfer, unit: usize) -> Result<Option<Message>, ProtocolError> {
        let remaining = transfer.size - transfer.sent;
        if remaining == 0 {
            return Ok(None);
        }

        let want = (remaining as usize).min(unit);
        let mut buf = vec![0u8; want];
        let n = loop {
            match transfer.file.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Err(ProtocolError::Violation(format!(
                "{} shrank during transfer ({} of {} bytes sent)",
                transfer.path, transfer.sent, transfer.size
            )));
        }

        buf.truncate(n);
        transfer.sent += n as u64;
        Ok(Some(Message::GetData { bytes: buf }))
    }
}

impl Processor for ServerProcessor {
    fn process(&mut self, message: Message) -> Result<(), ProtocolError> {
        if !message.is_request() {
            return Err(ProtocolError::UnexpectedMessage(message.name()));
        }
        if !self.is_idle() {
            return Err(ProtocolError::Violation(format!(
                "{} received while a response is in progress",
                message.name()
            )));
        }

        self.state = match message {
            Message::ListRequest { path } => State::AwaitingWrite(Some(self.handle_list(&path))),
            Message::GetRequest { path } => match self.open_transfer(&path) {
                Ok(transfer) => State::Sending(transfer),
                Err(e) => State::AwaitingWrite(Some(error_response(e))),
            },
            other => return Err(ProtocolError::UnexpectedMessage(other.name())),
        };
        Ok(())
    }

    fn next_outgoing(&mut self) -> Result<Option<Message>, ProtocolError> {
        match &mut self.state {
            State::Idle => Ok(None),
            State::AwaitingWrite(pending) => {
                let next = pending.take();
                if next.is_none() {
                    self.state = State::Idle;
                }
                Ok(next)
            }
            State::Sending(transfer) => {
                if let Some(header) = transfer.header.take() {
                    return Ok(Some(header));
                }
                match Self::next_chunk(transfer, self.transfer_unit)? {
                    Some(chunk) => Ok(Some(chunk)),
                    None => {
                        debug!(path = %transfer.path, size = transfer.size, "transfer complete");
                        // Dropping the transfer closes the file.
                        self.state = State::Idle;
                        Ok(None)
                    }
                }
            }
        }
    }
}

fn error_response(err: SandboxError) -> Message {
    match &err {
        SandboxError::Io { .. } => warn!("request failed: {err}"),
        _ => debug!("request rejected: {err}"),
    }
    Message::error(err.kind(), err.detail())
}
