//! Server handle: owns the event loop thread for one start/stop cycle.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;

use mio::net::TcpListener;
use mio::{Poll, Waker};
use tracing::{error, info, warn};

use crate::ServerError;
use crate::config::ServerConfig;
use crate::event_loop::{EventLoop, WAKER};
use crate::sandbox::SandboxRoot;

/// A running event loop.
struct Running {
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
    thread: JoinHandle<()>,
    exited: mpsc::Receiver<()>,
    local_addr: SocketAddr,
    root: PathBuf,
}

/// The file server.
///
/// Serves one root directory at a time. [`start`](Self::start) binds the
/// listener and spawns the event loop thread; [`stop`](Self::stop) shuts it
/// down and waits for the thread to exit, after which the port can be bound
/// again.
pub struct Server {
    config: ServerConfig,
    running: Option<Running>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }

    /// Returns `true` while the event loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.thread.is_finished())
    }

    /// Address the listener is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .as_ref()
            .filter(|r| !r.thread.is_finished())
            .map(|r| r.local_addr)
    }

    /// Canonical root directory being served, while running.
    pub fn root(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.root.as_path())
    }

    /// Starts serving `root`.
    ///
    /// Fails with [`ServerError::AlreadyStarted`] if the server is running;
    /// the running instance is left untouched.
    pub fn start(&mut self, root: impl AsRef<Path>) -> Result<(), ServerError> {
        if self.is_running() {
            return Err(ServerError::AlreadyStarted);
        }
        // Reap a loop thread that died on its own.
        if let Some(stale) = self.running.take() {
            let _ = stale.thread.join();
        }

        let root = root.as_ref();
        let sandbox = SandboxRoot::new(root).map_err(|e| ServerError::InvalidRoot {
            path: root.to_path_buf(),
            source: e,
        })?;
        let canonical_root = sandbox.path().to_path_buf();

        let addr = resolve_bind_addr(&self.config)?;
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let shutdown = Arc::new(AtomicBool::new(false));
        let event_loop = EventLoop::new(
            poll,
            listener,
            Arc::new(sandbox),
            self.config.clone(),
            Arc::clone(&shutdown),
        )?;

        let (exited_tx, exited) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("nioftp-server".into())
            .spawn(move || {
                if let Err(e) = event_loop.run() {
                    error!("event loop failed: {e}");
                }
                let _ = exited_tx.send(());
            })?;

        info!(%local_addr, root = %canonical_root.display(), "server started");
        self.running = Some(Running {
            shutdown,
            waker,
            thread,
            exited,
            local_addr,
            root: canonical_root,
        });
        Ok(())
    }

    /// Stops the server and closes every connection. No-op when not running.
    ///
    /// The loop finishes its current iteration and exits. If it does not
    /// exit within the configured grace period (e.g. a slow filesystem call
    /// is in progress) this logs a warning, wakes the loop again and keeps
    /// waiting: the call never returns before the thread has terminated.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.shutdown.store(true, Ordering::Release);
        if let Err(e) = running.waker.wake() {
            warn!("failed to wake event loop: {e}");
        }

        if let Err(mpsc::RecvTimeoutError::Timeout) =
            running.exited.recv_timeout(self.config.stop_grace())
        {
            warn!(
                grace_ms = self.config.stop_grace_ms,
                "event loop still busy after grace period, waiting for it to exit"
            );
            let _ = running.waker.wake();
        }

        if running.thread.join().is_err() {
            error!("event loop thread panicked");
        }
        info!(addr = %running.local_addr, "server stopped");
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolve_bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
    (config.bind_host.as_str(), config.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| ServerError::InvalidBindAddress(config.bind_host.clone()))
}
