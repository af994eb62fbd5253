//! Blocking client session.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;

use tracing::{debug, info, warn};

use nioftp_protocol::{Connection, ProtocolError, ReadProgress, WriteProgress};

use crate::config::ClientConfig;
use crate::processor::{ClientProcessor, Outcome, RemoteEntry};
use crate::ClientError;

struct Session {
    peer: SocketAddr,
    connection: Connection<TcpStream>,
    processor: ClientProcessor,
}

impl Session {
    /// Sends the queued request and drives reads until the processor reports
    /// an outcome.
    fn exchange(&mut self) -> Result<Outcome, ProtocolError> {
        while self.connection.on_writable(&mut self.processor)? == WriteProgress::Pending {}

        loop {
            match self.connection.on_readable(&mut self.processor)? {
                ReadProgress::FrameProcessed => {
                    if let Some(outcome) = self.processor.take_outcome() {
                        return Ok(outcome);
                    }
                }
                ReadProgress::Pending => {}
                ReadProgress::Closed => return Err(ProtocolError::ConnectionClosed),
            }
        }
    }
}

/// A client of one nioftp server.
///
/// Every operation blocks the calling thread until the server has answered.
/// A transport failure or protocol violation ends the session; later calls
/// fail with [`ClientError::NotConnected`] until [`connect`](Self::connect)
/// succeeds again.
pub struct Client {
    config: ClientConfig,
    session: Option<Session>,
    last_listing: Vec<RemoteEntry>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: None,
            last_listing: Vec::new(),
        }
    }

    /// Connects to `address` (`host`, `host:port` or a socket address).
    ///
    /// Any existing session is closed first. Returns `false` if the address
    /// cannot be resolved or no resolved address accepts the connection.
    pub fn connect(&mut self, address: &str) -> bool {
        self.close_session();

        let addrs = match resolve(address, self.config.port) {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!(address, "cannot resolve address: {e}");
                return false;
            }
        };
        let stream = match TcpStream::connect(&addrs[..]) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(address, "connection failed: {e}");
                return false;
            }
        };
        let peer = stream.peer_addr().unwrap_or(addrs[0]);
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {e}");
        }

        info!(%peer, "connected");
        self.session = Some(Session {
            peer,
            connection: Connection::new(stream, self.config.max_frame_len),
            processor: ClientProcessor::new(),
        });
        true
    }

    /// Closes the session.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        if self.close_session() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Address of the connected server.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(|s| s.peer)
    }

    /// Result of the last successful [`execute_list`](Self::execute_list).
    pub fn last_listing(&self) -> &[RemoteEntry] {
        &self.last_listing
    }

    /// Lists a remote directory: subdirectories first, then files.
    pub fn execute_list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ClientError> {
        let session = self.session.as_mut().ok_or(ClientError::NotConnected)?;
        session.processor.begin_list(path);

        match self.run()? {
            Outcome::Listing(entries) => {
                debug!(path, entries = entries.len(), "listed");
                self.last_listing.clone_from(&entries);
                Ok(entries)
            }
            Outcome::Rejected { kind, detail } => Err(ClientError::from_remote(kind, detail)),
            Outcome::Downloaded(_) => Err(self.fail(ProtocolError::UnexpectedMessage("GetData"))),
        }
    }

    /// Downloads remote file `src` to local path `dst`, returning the number
    /// of bytes written.
    ///
    /// `dst` is created (or truncated) only once the server has accepted the
    /// request. If the transfer fails part way, the partial file is removed.
    pub fn execute_get(&mut self, src: &str, dst: impl AsRef<Path>) -> Result<u64, ClientError> {
        let dst = dst.as_ref();
        let session = self.session.as_mut().ok_or(ClientError::NotConnected)?;
        session.processor.begin_get(src, dst);

        match self.run()? {
            Outcome::Downloaded(bytes) => {
                info!(src, dst = %dst.display(), bytes, "downloaded");
                Ok(bytes)
            }
            Outcome::Rejected { kind, detail } => Err(ClientError::from_remote(kind, detail)),
            Outcome::Listing(_) => {
                Err(self.fail(ProtocolError::UnexpectedMessage("ListResponse")))
            }
        }
    }

    fn run(&mut self) -> Result<Outcome, ClientError> {
        let session = self.session.as_mut().ok_or(ClientError::NotConnected)?;
        match session.exchange() {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Ends the session after a fatal error.
    fn fail(&mut self, err: ProtocolError) -> ClientError {
        if let Some(mut session) = self.session.take() {
            session.processor.abort();
            if err.is_transport() {
                warn!(peer = %session.peer, "connection lost: {err}");
            } else {
                warn!(peer = %session.peer, "closing connection: {err}");
            }
        }
        err.into()
    }

    fn close_session(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        session.processor.abort();
        let _ = session
            .connection
            .get_ref()
            .shutdown(std::net::Shutdown::Both);
        info!(peer = %session.peer, "disconnected");
        true
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

/// Resolves `address`, filling in `default_port` when it has none.
fn resolve(address: &str, default_port: u16) -> io::Result<Vec<SocketAddr>> {
    let address = address.trim();
    if address.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty address"));
    }

    let addrs: Vec<SocketAddr> = if let Ok(addr) = address.parse::<SocketAddr>() {
        vec![addr]
    } else if let Some((host, port)) = split_port(address) {
        (host, port).to_socket_addrs()?.collect()
    } else {
        let host = address.trim_start_matches('[').trim_end_matches(']');
        (host, default_port).to_socket_addrs()?.collect()
    };

    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {address}"),
        ));
    }
    Ok(addrs)
}

/// Splits `host:port`. A bare IPv6 address (several colons) has no port.
fn split_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    if host.contains(':') {
        return None;
    }
    Some((host, port.parse().ok()?))
}
