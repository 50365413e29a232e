//! TCP server base shared by the repo, status and channel-info servers.
//!
//! A [`TcpServer`] owns one accept loop and hands each accepted connection
//! to its [`ClientHandler`] in a task of its own. Handler failures are
//! logged and never reach the accept loop.
//!
//! State moves `Stopped -> Starting -> Listening -> Stopped`. `start()`
//! binds and leaves the server `Starting`; the accept loop flips it to
//! `Listening` once it runs.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Listen backlog of every server.
pub const BACKLOG: u32 = 5;

/// Per-connection logic of a server.
#[async_trait]
pub trait ClientHandler: Send + Sync + 'static {
    /// Component name used in log lines.
    fn name(&self) -> &'static str;

    async fn process_client(&self, stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
}

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
}

pub struct TcpServer<H> {
    bind_addr: SocketAddr,
    handler: Arc<H>,
    state: Arc<watch::Sender<ServerState>>,
    running: Mutex<Option<Running>>,
    clients: TaskTracker,
}

impl<H: ClientHandler> TcpServer<H> {
    pub fn new(bind_addr: SocketAddr, handler: H) -> Self {
        let (state, _) = watch::channel(ServerState::Stopped);
        Self {
            bind_addr,
            handler: Arc::new(handler),
            state: Arc::new(state),
            running: Mutex::new(None),
            clients: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Wait until the current start attempt settles. Returns whether the
    /// server ended up listening.
    pub async fn listening(&self) -> bool {
        let mut state = self.state.subscribe();
        match state.wait_for(|s| *s != ServerState::Starting).await {
            Ok(settled) => *settled == ServerState::Listening,
            Err(_) => false,
        }
    }

    /// Address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .ok()
            .and_then(|running| running.as_ref().map(|r| r.local_addr))
    }

    /// Bind and spawn the accept loop. Must be called from within a Tokio
    /// runtime. Returns the bound address, which differs from the configured
    /// one when binding port 0.
    ///
    /// Starting a server that is already running logs a warning and
    /// returns the existing address.
    pub fn start(&self) -> anyhow::Result<SocketAddr> {
        let name = self.handler.name();
        let mut running = self
            .running
            .lock()
            .map_err(|_| anyhow::anyhow!("{name} server state is poisoned"))?;

        if let Some(running) = running.as_ref() {
            warn!(server = name, addr = %running.local_addr, "Server is already running");
            return Ok(running.local_addr);
        }

        self.state.send_replace(ServerState::Starting);
        let (listener, local_addr) = match bind(self.bind_addr) {
            Ok(bound) => bound,
            Err(e) => {
                self.state.send_replace(ServerState::Stopped);
                error!(server = name, addr = %self.bind_addr, error = %format!("{e:#}"), "Failed to start server");
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        self.clients.reopen();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            local_addr,
            self.handler.clone(),
            self.clients.clone(),
            self.state.clone(),
            cancel.clone(),
        ));

        *running = Some(Running {
            local_addr,
            cancel,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Stop accepting and close the listening socket. Connections already
    /// being served finish on their own. Idempotent.
    pub async fn stop(&self) {
        let name = self.handler.name();
        let running = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(_) => {
                error!(server = name, "Server state is poisoned");
                None
            }
        };
        let Some(running) = running else {
            return;
        };

        self.state.send_replace(ServerState::Stopped);
        running.cancel.cancel();
        if let Err(e) = running.accept_task.await {
            error!(server = name, error = %e, "Accept loop ended abnormally");
        }
        info!(server = name, "Server stopped");
    }

    /// Wait for every in-flight connection to finish.
    pub async fn wait_for_clients(&self) {
        self.clients.close();
        self.clients.wait().await;
        self.clients.reopen();
    }
}

fn bind(addr: SocketAddr) -> anyhow::Result<(TcpListener, SocketAddr)> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .context("Failed to create socket")?;

    socket.set_reuseaddr(true)?;
    socket
        .bind(addr)
        .with_context(|| format!("Failed to bind {addr}"))?;
    let listener = socket.listen(BACKLOG).context("Failed to listen")?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

async fn accept_loop<H: ClientHandler>(
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: Arc<H>,
    clients: TaskTracker,
    state: Arc<watch::Sender<ServerState>>,
    cancel: CancellationToken,
) {
    let name = handler.name();

    // A stop() that raced ahead has already moved the state to Stopped.
    let listening = state.send_if_modified(|s| {
        let starting = *s == ServerState::Starting;
        if starting {
            *s = ServerState::Listening;
        }
        starting
    });
    if listening {
        info!(server = name, addr = %local_addr, "Server listening");
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(server = name, peer = %peer, "Client connected");
                        let handler = handler.clone();
                        clients.spawn(async move {
                            if let Err(e) = handler.process_client(stream, peer).await {
                                error!(server = name, peer = %peer, error = %format!("{e:#}"), "Failed to process client");
                            }
                            debug!(server = name, peer = %peer, "Client disconnected");
                        });
                    }
                    Err(e) => {
                        error!(server = name, error = %e, "Failed to accept connection");
                    }
                }
            }
        }
    }
    // Dropping the listener closes the socket.
}
