//! Single-threaded readiness loop.
//!
//! One thread owns the listening socket and every accepted connection. Each
//! connection pairs a [`Connection`] engine with a [`ServerProcessor`]; the
//! loop dispatches readiness events to them and re-registers the socket
//! whenever the processor's interest changes. Filesystem work happens inline
//! on this thread.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Poll, Token};
use tracing::{debug, info, warn};

use nioftp_protocol::{Connection, ProtocolError, ReadProgress};

use crate::config::ServerConfig;
use crate::processor::{Interest, ServerProcessor};
use crate::sandbox::SandboxRoot;

pub(crate) const LISTENER: Token = Token(0);
pub(crate) const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

/// An accepted client.
struct Peer {
    addr: SocketAddr,
    connection: Connection<TcpStream>,
    processor: ServerProcessor,
    registered: Interest,
}

/// What the loop should do with a peer after servicing it.
enum Disposition {
    Keep,
    Close,
}

impl Peer {
    /// Handles one readiness event.
    fn service(&mut self, event: &Event) -> Result<Disposition, ProtocolError> {
        if event.is_error() {
            return Err(ProtocolError::ConnectionClosed);
        }

        if event.is_readable() && self.registered == Interest::Readable {
            // Edge-triggered: keep reading until the socket would block or the
            // processor stops accepting requests.
            while self.processor.interest() == Interest::Readable {
                match self.connection.on_readable(&mut self.processor)? {
                    ReadProgress::FrameProcessed => {}
                    ReadProgress::Pending => break,
                    ReadProgress::Closed => return Ok(Disposition::Close),
                }
            }
        }

        if event.is_writable() && self.registered == Interest::Writable {
            self.connection.on_writable(&mut self.processor)?;
        }

        Ok(Disposition::Keep)
    }
}

fn to_mio(interest: Interest) -> mio::Interest {
    match interest {
        Interest::Readable => mio::Interest::READABLE,
        Interest::Writable => mio::Interest::WRITABLE,
    }
}

pub(crate) struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    peers: HashMap<Token, Peer>,
    next_token: usize,
    root: Arc<SandboxRoot>,
    config: ServerConfig,
    shutdown: Arc<AtomicBool>,
}

impl EventLoop {
    /// Registers `listener` with `poll`. The waker (if any) must already be
    /// registered under [`WAKER`].
    pub(crate) fn new(
        poll: Poll,
        mut listener: TcpListener,
        root: Arc<SandboxRoot>,
        config: ServerConfig,
        shutdown: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        poll.registry()
            .register(&mut listener, LISTENER, mio::Interest::READABLE)?;
        Ok(Self {
            poll,
            listener,
            peers: HashMap::new(),
            next_token: FIRST_CONNECTION,
            root,
            config,
            shutdown,
        })
    }

    /// Runs until the shutdown flag is observed, then closes every socket.
    pub(crate) fn run(mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(self.config.events_capacity.max(1));

        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                self.close_all();
                return Err(e);
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_all(),
                    WAKER => {}
                    token => self.dispatch(token, event),
                }
            }
        }

        self.close_all();
        Ok(())
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, mio::Interest::READABLE)
                    {
                        warn!(%addr, "failed to register connection: {e}");
                        continue;
                    }

                    debug!(%addr, connections = self.peers.len() + 1, "connection accepted");
                    self.peers.insert(
                        token,
                        Peer {
                            addr,
                            connection: Connection::new(stream, self.config.max_frame_len),
                            processor: ServerProcessor::new(
                                Arc::clone(&self.root),
                                self.config.transfer_unit,
                            ),
                            registered: Interest::Readable,
                        },
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // Typically fd exhaustion; the listener stays registered
                    // and the next readiness event retries.
                    warn!("accept error: {e}");
                    return;
                }
            }
        }
    }

    fn dispatch(&mut self, token: Token, event: &Event) {
        let Some(peer) = self.peers.get_mut(&token) else {
            return;
        };

        let close = match peer.service(event) {
            Ok(Disposition::Keep) => false,
            Ok(Disposition::Close) => {
                debug!(addr = %peer.addr, "connection closed by peer");
                true
            }
            Err(e) if e.is_transport() => {
                debug!(addr = %peer.addr, "connection lost: {e}");
                true
            }
            Err(e) => {
                warn!(addr = %peer.addr, "closing connection: {e}");
                true
            }
        };

        if !close {
            let wanted = peer.processor.interest();
            if wanted == peer.registered {
                return;
            }
            match self.poll.registry().reregister(
                peer.connection.get_mut(),
                token,
                to_mio(wanted),
            ) {
                Ok(()) => {
                    peer.registered = wanted;
                    return;
                }
                Err(e) => warn!(addr = %peer.addr, "failed to re-register connection: {e}"),
            }
        }

        self.close(token);
    }

    fn close(&mut self, token: Token) {
        if let Some(mut peer) = self.peers.remove(&token) {
            let _ = self.poll.registry().deregister(peer.connection.get_mut());
        }
    }

    fn close_all(&mut self) {
        let count = self.peers.len();
        let tokens: Vec<Token> = self.peers.keys().copied().collect();
        for token in tokens {
            self.close(token);
        }
        let _ = self.poll.registry().deregister(&mut self.listener);
        info!(connections = count, "event loop stopped");
    }
}
