//! Observability and Metrics
//!
//! Atomic counters for sessions, framing errors, mailboxes and timers.
//! A [`Metrics`] value is shared through `Arc` by whoever opens sessions or
//! creates mailboxes; there is no global instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for transport and runtime operations
#[derive(Debug)]
pub struct Metrics {
    /// Total sessions opened
    pub sessions_total: AtomicU64,
    /// Currently open sessions
    pub sessions_active: AtomicU64,
    /// Total packets written
    pub messages_sent: AtomicU64,
    /// Total packets decoded
    pub messages_received: AtomicU64,
    /// Total payload bytes written
    pub bytes_sent: AtomicU64,
    /// Total payload bytes decoded
    pub bytes_received: AtomicU64,
    /// Socket-level failures
    pub connection_errors: AtomicU64,
    /// Framing violations
    pub protocol_errors: AtomicU64,
    /// Envelopes accepted by mailboxes
    pub mailbox_posts: AtomicU64,
    /// Envelopes rejected by closed mailboxes
    pub mailbox_rejections: AtomicU64,
    /// Timers that reached their deadline
    pub timers_fired: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            mailbox_posts: AtomicU64::new(0),
            mailbox_rejections: AtomicU64::new(0),
            timers_fired: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a session reaching the open state
    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session closing
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a message sent
    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a message received
    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a connection error
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a protocol error
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted mailbox post
    pub fn mailbox_post(&self) {
        self.mailbox_posts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a post refused by a closed mailbox
    pub fn mailbox_rejection(&self) {
        self.mailbox_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timer firing
    pub fn timer_fired(&self) {
        self.timers_fired.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            mailbox_posts: self.mailbox_posts.load(Ordering::Relaxed),
            mailbox_rejections: self.mailbox_rejections.load(Ordering::Relaxed),
            timers_fired: self.timers_fired.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            sessions_total = snapshot.sessions_total,
            sessions_active = snapshot.sessions_active,
            messages_sent = snapshot.messages_sent,
            messages_received = snapshot.messages_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            connection_errors = snapshot.connection_errors,
            protocol_errors = snapshot.protocol_errors,
            mailbox_posts = snapshot.mailbox_posts,
            mailbox_rejections = snapshot.mailbox_rejections,
            timers_fired = snapshot.timers_fired,
            uptime_seconds = snapshot.uptime_seconds,
            "Runtime metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sessions_total: u64,
    pub sessions_active: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connection_errors: u64,
    pub protocol_errors: u64,
    pub mailbox_posts: u64,
    pub mailbox_rejections: u64,
    pub timers_fired: u64,
    pub uptime_seconds: u64,
}
