//! TCP listener and connector.
//!
//! Both sides hand every established stream to a [`SessionFactory`]; from there
//! on a server session and a client session behave identically.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ClientConfig, ServerConfig};
use crate::error::{ProtocolError, Result};
use crate::transport::session::{Session, SessionFactory};
use crate::utils::timeout::with_timeout_error;

/// Open sessions of one server, pruned as they finish
#[derive(Clone, Default)]
struct SessionTable {
    sessions: Arc<Mutex<Vec<Session>>>,
}

impl SessionTable {
    fn lock(&self) -> MutexGuard<'_, Vec<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Live sessions after dropping the finished ones
    fn live(&self) -> Vec<Session> {
        let mut sessions = self.lock();
        sessions.retain(|s| !s.is_finished());
        sessions.clone()
    }

    fn insert(&self, session: Session) {
        self.lock().push(session);
    }
}

/// A bound TCP listener that opens a session per accepted connection
pub struct TcpServer {
    listener: TcpListener,
    factory: SessionFactory,
    max_connections: usize,
    shutdown_timeout: Duration,
    sessions: SessionTable,
}

impl TcpServer {
    /// Bind to `config.address`
    #[instrument(skip(config, factory), fields(address = %config.address))]
    pub async fn bind(config: &ServerConfig, factory: SessionFactory) -> Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!(address = %listener.local_addr()?, "Listening");
        Ok(Self {
            listener,
            factory,
            max_connections: config.max_connections.max(1),
            shutdown_timeout: config.shutdown_timeout,
            sessions: SessionTable::default(),
        })
    }

    /// The bound address; useful after binding to port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Sessions currently open on this server
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.live()
    }

    /// Accept connections until CTRL+C, then shut down gracefully
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Accept connections until `shutdown_rx` yields or its sender is dropped.
    ///
    /// On shutdown every open session is closed gracefully; sessions still
    /// draining after the shutdown timeout are closed immediately.
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    self.shutdown().await;
                    return Ok(());
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer),
                    Err(e) => {
                        self.factory.metrics().connection_error();
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let live = self.sessions.live().len();
        if live >= self.max_connections {
            self.factory.metrics().connection_error();
            warn!(%peer, live, limit = self.max_connections, "Connection limit reached, rejecting");
            return;
        }

        let local = match stream.local_addr() {
            Ok(local) => local,
            Err(e) => {
                self.factory.metrics().connection_error();
                error!(%peer, error = %e, "Accepted socket has no local address");
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let session = self.factory.open(stream, local, peer);
        info!(%peer, session = session.id(), "New connection established");
        self.sessions.insert(session);
    }

    async fn shutdown(&self) {
        let sessions = self.sessions.live();
        info!(
            connections = sessions.len(),
            "Shutting down server. Waiting for connections to close..."
        );

        for session in &sessions {
            session.close(false);
        }

        let all_closed = join_all(sessions.iter().map(|s| s.closed()));
        if tokio::time::timeout(self.shutdown_timeout, all_closed)
            .await
            .is_err()
        {
            warn!("Shutdown timeout reached, forcing exit");
            for session in &sessions {
                session.close(true);
            }
            join_all(sessions.iter().map(|s| s.closed())).await;
        }
        info!("All connections closed, shutting down");
    }
}

/// Connect to `address` and open a session over the stream.
///
/// Fails with [`ProtocolError::Timeout`] if no connection is made within
/// `timeout`.
#[instrument(skip(factory))]
pub async fn connect(address: &str, timeout: Duration, factory: &SessionFactory) -> Result<Session> {
    let stream = with_timeout_error(
        async { TcpStream::connect(address).await.map_err(ProtocolError::from) },
        timeout,
    )
    .await
    .inspect_err(|_| factory.metrics().connection_error())?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
    let local = stream.local_addr()?;
    let remote = stream.peer_addr()?;
    let session = factory.open(stream, local, remote);
    info!(%remote, session = session.id(), "Connected");
    Ok(session)
}

/// [`connect`] using the address and timeout from `config`
pub async fn connect_with_config(config: &ClientConfig, factory: &SessionFactory) -> Result<Session> {
    connect(&config.address, config.connection_timeout, factory).await
}
