//! # Sessions
//!
//! A [`Session`] is one live connection: its framing state, its traffic
//! counters and the I/O task that moves bytes between the socket and the codec.
//!
//! ## Lifecycle
//! ```text
//! Created ──▶ Open ──▶ Closed
//!    └───────────────────▲
//! ```
//! `close(true)` stops the I/O task at once and drops queued outgoing packets.
//! `close(false)` lets the writer flush every packet queued before the call,
//! bounded by the drain timeout, then shuts the connection down. In both cases
//! the session reports `Closed` immediately; `session_closed` fires once the
//! I/O task has finished.
//!
//! ## Concurrency
//! `send` only enqueues, so it may be called from any thread. The outgoing
//! queue's sender sits behind a lock that `close` empties, so a packet is
//! either refused or queued ahead of the close and written during the drain.
//! The fetcher, the separator and the counters are touched only by the
//! session's own I/O task.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::TransportConfig;
use crate::core::codec::{Fetcher, Separator};
use crate::core::packet::Packet;
use crate::core::serialization::{MultiFormat, SerializationFormat};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::{Protocol, ProtocolRegistry};
use crate::transport::handler::SessionHandler;
use crate::utils::metrics::Metrics;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Open,
    Closed,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Created,
            1 => SessionState::Open,
            _ => SessionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Created => 0,
            SessionState::Open => 1,
            SessionState::Closed => 2,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent_messages: AtomicU64,
    sent_bytes: AtomicU64,
    received_messages: AtomicU64,
    received_bytes: AtomicU64,
}

struct SessionInner {
    id: u64,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    protocol: String,
    state: AtomicU8,
    counters: Counters,
    /// Taken by `close`; the writer stops once the queue behind it is empty
    outgoing: Mutex<Option<mpsc::UnboundedSender<Packet>>>,
    /// Stops both I/O loops immediately
    hard_stop: CancellationToken,
    /// Set by a graceful close; starts the drain deadline
    close_requested: CancellationToken,
    /// Set after `session_closed` has run
    finished: CancellationToken,
}

impl SessionInner {
    fn outgoing_queue(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Packet>>> {
        self.outgoing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to a live connection. Clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Process-unique session number
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    /// Name of the transport this session frames with
    pub fn protocol(&self) -> &str {
        &self.inner.protocol
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// True only while open; false as soon as a close is requested
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// True once the I/O task has stopped and `session_closed` has run
    pub fn is_finished(&self) -> bool {
        self.inner.finished.is_cancelled()
    }

    /// Wait until the session is fully closed
    pub async fn closed(&self) {
        self.inner.finished.cancelled().await
    }

    pub fn sent_messages_count(&self) -> u64 {
        self.inner.counters.sent_messages.load(Ordering::Acquire)
    }

    /// Payload bytes written to the connection
    pub fn sent_bytes_count(&self) -> u64 {
        self.inner.counters.sent_bytes.load(Ordering::Acquire)
    }

    pub fn received_messages_count(&self) -> u64 {
        self.inner.counters.received_messages.load(Ordering::Acquire)
    }

    /// Payload bytes decoded from the connection
    pub fn received_bytes_count(&self) -> u64 {
        self.inner.counters.received_bytes.load(Ordering::Acquire)
    }

    /// Queue `message` for transmission.
    ///
    /// Counters move once the bytes are written, not here. Fails with
    /// `ConnectionClosed` after `close` was called.
    pub fn send(&self, message: impl Into<Packet>) -> Result<()> {
        let outgoing = self.inner.outgoing_queue();
        match outgoing.as_ref() {
            Some(tx) => tx
                .send(message.into())
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Serialize `value` into a packet and queue it
    pub fn send_value<T: MultiFormat>(&self, value: &T, format: SerializationFormat) -> Result<()> {
        self.send(Packet::from_value(value, format)?)
    }

    /// Close the session; `quick_close` discards queued outgoing data.
    ///
    /// Calling it again is harmless. A quick close after a graceful one cuts the
    /// drain short.
    pub fn close(&self, quick_close: bool) {
        let previous = SessionState::from_u8(
            self.inner
                .state
                .swap(SessionState::Closed.as_u8(), Ordering::AcqRel),
        );

        // later sends fail; packets already queued stay for the writer
        drop(self.inner.outgoing_queue().take());

        if quick_close {
            if !self.inner.hard_stop.is_cancelled() {
                debug!(session = self.inner.id, "Session closing immediately");
            }
            self.inner.hard_stop.cancel();
        } else if previous != SessionState::Closed {
            debug!(session = self.inner.id, "Session draining before close");
            self.inner.close_requested.cancel();
        }
    }

    /// Report `cause` to the handler and tear the session down
    fn fail(&self, handler: &dyn SessionHandler, metrics: &Metrics, cause: ProtocolError) {
        match &cause {
            ProtocolError::ProtocolViolation(_) => metrics.protocol_error(),
            _ => metrics.connection_error(),
        }
        warn!(session = self.inner.id, error = %cause, "Session error");
        handler.exception_caught(self, &cause);
        self.close(true);
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("local_addr", &self.inner.local_addr)
            .field("remote_addr", &self.inner.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Per-session I/O settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub read_buffer_size: usize,
    pub drain_timeout: Duration,
}

impl SessionOptions {
    pub fn new(read_buffer_size: usize, drain_timeout: Duration) -> Result<Self> {
        if read_buffer_size == 0 {
            return Err(ProtocolError::InvalidArgument(
                constants::ERR_ZERO_READ_BUFFER.to_string(),
            ));
        }
        Ok(Self {
            read_buffer_size,
            drain_timeout,
        })
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        Self::new(config.read_buffer_size, config.drain_timeout)
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        let config = TransportConfig::default();
        Self {
            read_buffer_size: config.read_buffer_size,
            drain_timeout: config.drain_timeout,
        }
    }
}

/// Opens sessions sharing one protocol, one handler and one metrics sink.
#[derive(Clone)]
pub struct SessionFactory {
    protocol: Arc<dyn Protocol>,
    handler: Arc<dyn SessionHandler>,
    options: SessionOptions,
    metrics: Arc<Metrics>,
}

impl SessionFactory {
    pub fn new(
        protocol: Arc<dyn Protocol>,
        handler: Arc<dyn SessionHandler>,
        options: SessionOptions,
    ) -> Self {
        Self {
            protocol,
            handler,
            options,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Factory for the transport named in `config`.
    ///
    /// Fails with `UnsupportedProtocol` if the registry does not know it.
    pub fn from_config(
        registry: &ProtocolRegistry,
        config: &TransportConfig,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Self> {
        let protocol = registry.resolve(&config.protocol)?;
        Ok(Self::new(
            protocol,
            handler,
            SessionOptions::from_config(config)?,
        ))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Start a session over `io` and spawn its I/O task.
    ///
    /// Fires `session_created` and `session_opened` before returning. Must be
    /// called from within a tokio runtime.
    pub fn open<S>(&self, io: S, local_addr: SocketAddr, remote_addr: SocketAddr) -> Session
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session {
            inner: Arc::new(SessionInner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                local_addr,
                remote_addr,
                protocol: self.protocol.name().to_string(),
                state: AtomicU8::new(SessionState::Created.as_u8()),
                counters: Counters::default(),
                outgoing: Mutex::new(Some(tx)),
                hard_stop: CancellationToken::new(),
                close_requested: CancellationToken::new(),
                finished: CancellationToken::new(),
            }),
        };

        self.handler.session_created(&session);

        let opened = session
            .inner
            .state
            .compare_exchange(
                SessionState::Created.as_u8(),
                SessionState::Open.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        self.metrics.session_opened();
        if opened {
            debug!(
                session = session.id(),
                local = %local_addr,
                remote = %remote_addr,
                protocol = %session.protocol(),
                "Session opened"
            );
            self.handler.session_opened(&session);
        }

        let driver = Driver {
            session: session.clone(),
            fetcher: self.protocol.create_fetcher(),
            separator: self.protocol.create_separator(),
            handler: self.handler.clone(),
            metrics: self.metrics.clone(),
            options: self.options,
        };
        tokio::spawn(driver.run(io, rx));

        session
    }
}

impl fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("protocol", &self.protocol.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// The I/O task of one session
struct Driver {
    session: Session,
    fetcher: Box<dyn Fetcher>,
    separator: Box<dyn Separator>,
    handler: Arc<dyn SessionHandler>,
    metrics: Arc<Metrics>,
    options: SessionOptions,
}

impl Driver {
    async fn run<S>(self, io: S, mut rx: mpsc::UnboundedReceiver<Packet>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let Driver {
            session,
            mut fetcher,
            mut separator,
            handler,
            metrics,
            options,
        } = self;
        let (reader, writer) = tokio::io::split(io);

        let io_loops = async {
            tokio::join!(
                read_loop(
                    &session,
                    reader,
                    fetcher.as_mut(),
                    handler.as_ref(),
                    &metrics,
                    options.read_buffer_size,
                ),
                write_loop(
                    &session,
                    writer,
                    separator.as_mut(),
                    &mut rx,
                    handler.as_ref(),
                    &metrics,
                ),
            );
        };

        let drain_timeout = options.drain_timeout;
        let drain_deadline = async {
            session.inner.close_requested.cancelled().await;
            tokio::time::sleep(drain_timeout).await;
        };

        tokio::select! {
            _ = io_loops => {}
            _ = drain_deadline => {
                warn!(session = session.id(), "Drain timeout expired, closing hard");
            }
        }

        session
            .inner
            .state
            .store(SessionState::Closed.as_u8(), Ordering::Release);
        session.inner.hard_stop.cancel();
        rx.close();
        fetcher.reset();

        metrics.session_closed();
        debug!(
            session = session.id(),
            sent = session.sent_messages_count(),
            received = session.received_messages_count(),
            "Session closed"
        );
        handler.session_closed(&session);
        session.inner.finished.cancel();
    }
}

async fn read_loop<R>(
    session: &Session,
    mut reader: R,
    fetcher: &mut dyn Fetcher,
    handler: &dyn SessionHandler,
    metrics: &Metrics,
    buffer_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let stop = &session.inner.hard_stop;
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = tokio::select! {
            _ = stop.cancelled() => return,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(session = session.id(), "Peer closed the connection");
                    session.close(false);
                    return;
                }
                Ok(n) => n,
                Err(e) => {
                    if !stop.is_cancelled() {
                        session.fail(handler, metrics, e.into());
                    }
                    return;
                }
            }
        };

        let packets = match fetcher.fetch(&buf[..n]) {
            Ok(packets) => packets,
            Err(e) => {
                session.fail(handler, metrics, e);
                return;
            }
        };

        trace!(
            session = session.id(),
            bytes = n,
            packets = packets.len(),
            "Read"
        );

        for packet in packets {
            if stop.is_cancelled() {
                return;
            }
            let len = packet.len() as u64;
            let counters = &session.inner.counters;
            counters.received_messages.fetch_add(1, Ordering::AcqRel);
            counters.received_bytes.fetch_add(len, Ordering::AcqRel);
            metrics.message_received(len);
            handler.message_received(session, packet);
        }
    }
}

async fn write_loop<W>(
    session: &Session,
    mut writer: W,
    separator: &mut dyn Separator,
    rx: &mut mpsc::UnboundedReceiver<Packet>,
    handler: &dyn SessionHandler,
    metrics: &Metrics,
) where
    W: AsyncWrite + Unpin,
{
    let stop = &session.inner.hard_stop;

    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            next = rx.recv() => next,
        };

        // `None` once the sender is gone and everything before it was taken
        let Some(packet) = next else { break };

        let chunks = match separator.separate(&packet) {
            Ok(chunks) => chunks,
            Err(e) => {
                // refused before touching the wire; the stream is still in sync
                metrics.protocol_error();
                warn!(session = session.id(), error = %e, "Outgoing packet rejected");
                handler.exception_caught(session, &e);
                continue;
            }
        };

        let write_all = async {
            for chunk in &chunks {
                writer.write_all(chunk).await?;
            }
            writer.flush().await
        };

        let written = tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            written = write_all => written,
        };

        match written {
            Ok(()) => {
                let len = packet.len() as u64;
                let counters = &session.inner.counters;
                counters.sent_messages.fetch_add(1, Ordering::AcqRel);
                counters.sent_bytes.fetch_add(len, Ordering::AcqRel);
                metrics.message_sent(len);
                handler.message_sent(session, &packet);
            }
            Err(e) => {
                session.fail(handler, metrics, e.into());
                return;
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(session = session.id(), error = %e, "Shutdown after drain failed");
    }
    stop.cancel();
}
