//! Client side of the request/response exchange.
//!
//! The processor holds the one request in flight and turns the server's
//! answer into an [`Outcome`]. Downloads are written straight to the
//! destination file as chunks arrive.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use nioftp_protocol::{ErrorKind, Message, Processor, ProtocolError};

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// How a request ended, short of a fatal error.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Listing(Vec<RemoteEntry>),
    Downloaded(u64),
    Rejected { kind: ErrorKind, detail: String },
}

#[derive(Debug)]
struct Download {
    src: String,
    dst: PathBuf,
    sink: Option<File>,
    expected: u64,
    received: u64,
}

#[derive(Debug)]
enum Query {
    None,
    List,
    Get(Download),
}

/// Request state of one client session.
#[derive(Debug)]
pub(crate) struct ClientProcessor {
    outgoing: Option<Message>,
    query: Query,
    outcome: Option<Outcome>,
}

impl ClientProcessor {
    pub(crate) fn new() -> Self {
        Self {
            outgoing: None,
            query: Query::None,
            outcome: None,
        }
    }

    /// Queues a `ListRequest`.
    pub(crate) fn begin_list(&mut self, path: &str) {
        self.outgoing = Some(Message::ListRequest {
            path: path.to_owned(),
        });
        self.query = Query::List;
        self.outcome = None;
    }

    /// Queues a `GetRequest`. `dst` is not touched until the header arrives.
    pub(crate) fn begin_get(&mut self, src: &str, dst: &Path) {
        self.outgoing = Some(Message::GetRequest {
            path: src.to_owned(),
        });
        self.query = Query::Get(Download {
            src: src.to_owned(),
            dst: dst.to_path_buf(),
            sink: None,
            expected: 0,
            received: 0,
        });
        self.outcome = None;
    }

    /// Takes the result of the finished request, if it has finished.
    pub(crate) fn take_outcome(&mut self) -> Option<Outcome> {
        self.outcome.take()
    }

    /// Drops the request in flight after a fatal error, removing a partially
    /// written destination file.
    pub(crate) fn abort(&mut self) {
        self.outgoing = None;
        self.outcome = None;
        if let Query::Get(download) = std::mem::replace(&mut self.query, Query::None) {
            if let Some(sink) = download.sink {
                drop(sink);
                if let Err(e) = std::fs::remove_file(&download.dst) {
                    warn!(dst = %download.dst.display(), "failed to remove partial download: {e}");
                }
            }
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        self.query = Query::None;
        self.outcome = Some(outcome);
    }

    fn on_list(&mut self, message: Message) -> Result<(), ProtocolError> {
        match message {
            Message::ListResponse { directories, files } => {
                let entries = directories
                    .into_iter()
                    .map(|name| RemoteEntry { name, is_dir: true })
                    .chain(files.into_iter().map(|name| RemoteEntry {
                        name,
                        is_dir: false,
                    }))
                    .collect();
                self.finish(Outcome::Listing(entries));
                Ok(())
            }
            Message::Error { kind, detail } => {
                self.finish(Outcome::Rejected { kind, detail });
                Ok(())
            }
            other => Err(ProtocolError::UnexpectedMessage(other.name())),
        }
    }

    fn on_get(&mut self, message: Message) -> Result<(), ProtocolError> {
        let Query::Get(download) = &mut self.query else {
            return Err(ProtocolError::UnexpectedMessage(message.name()));
        };
        let started = download.sink.is_some();

        let done = match message {
            Message::Error { kind, detail } if !started => {
                self.finish(Outcome::Rejected { kind, detail });
                return Ok(());
            }
            Message::GetHeader { path, size } if !started => {
                if path != download.src {
                    return Err(ProtocolError::Violation(format!(
                        "header for {path} while downloading {}",
                        download.src
                    )));
                }
                debug!(src = %download.src, size, "download started");
                download.sink = Some(File::create(&download.dst)?);
                download.expected = size;
                size == 0
            }
            Message::GetData { bytes } if started => {
                let total = download.received + bytes.len() as u64;
                if total > download.expected {
                    return Err(ProtocolError::Violation(format!(
                        "received {total} bytes of {} for a {}-byte file",
                        download.src, download.expected
                    )));
                }
                if let Some(sink) = download.sink.as_mut() {
                    sink.write_all(&bytes)?;
                }
                download.received = total;
                total == download.expected
            }
            other => return Err(ProtocolError::UnexpectedMessage(other.name())),
        };

        if done {
            self.complete_download()?;
        }
        Ok(())
    }

    fn complete_download(&mut self) -> Result<(), ProtocolError> {
        let Query::Get(download) = std::mem::replace(&mut self.query, Query::None) else {
            return Ok(());
        };
        if let Some(mut sink) = download.sink {
            sink.flush()?;
        }
        debug!(src = %download.src, bytes = download.received, "download complete");
        self.finish(Outcome::Downloaded(download.received));
        Ok(())
    }
}

impl Processor for ClientProcessor {
    fn process(&mut self, message: Message) -> Result<(), ProtocolError> {
        match self.query {
            Query::None => Err(ProtocolError::UnexpectedMessage(message.name())),
            Query::List => self.on_list(message),
            Query::Get(_) => self.on_get(message),
        }
    }

    fn next_outgoing(&mut self) -> Result<Option<Message>, ProtocolError> {
        Ok(self.outgoing.take())
    }
}
