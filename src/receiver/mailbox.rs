use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, instrument, warn};

use crate::config::MailboxConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::receiver::message::ReceiverMessage;
use crate::utils::metrics::Metrics;

struct Shared {
    name: String,
    pending: AtomicUsize,
    backlog_warning: usize,
    backlog_warned: AtomicBool,
    metrics: Option<Arc<Metrics>>,
}

impl Shared {
    fn consumed(&self) {
        let before = self.pending.fetch_sub(1, Ordering::AcqRel);
        if before <= self.backlog_warning {
            self.backlog_warned.store(false, Ordering::Relaxed);
        }
    }
}

/// Producer handle of a mailbox.
///
/// Cheap to clone and safe to use from any thread: I/O tasks, timer tasks and
/// worker threads all post through clones of the same handle.
#[derive(Clone)]
pub struct Receiver {
    tx: mpsc::UnboundedSender<ReceiverMessage>,
    shared: Arc<Shared>,
}

impl Receiver {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Append `message` to the mailbox and return immediately.
    ///
    /// Fails with [`ProtocolError::MailboxClosed`] once the consumer has started
    /// tearing the mailbox down; the message is not enqueued in that case.
    pub fn post_message(&self, message: ReceiverMessage) -> Result<()> {
        let pending = self.shared.pending.fetch_add(1, Ordering::AcqRel) + 1;

        if let Err(mpsc::error::SendError(rejected)) = self.tx.send(message) {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            if let Some(metrics) = &self.shared.metrics {
                metrics.mailbox_rejection();
            }
            debug!(
                mailbox = %self.shared.name,
                kind = rejected.kind(),
                "Post to closed mailbox rejected"
            );
            return Err(ProtocolError::MailboxClosed(self.shared.name.clone()));
        }

        if let Some(metrics) = &self.shared.metrics {
            metrics.mailbox_post();
        }

        if pending > self.shared.backlog_warning
            && !self.shared.backlog_warned.swap(true, Ordering::Relaxed)
        {
            warn!(
                mailbox = %self.shared.name,
                pending,
                threshold = self.shared.backlog_warning,
                "Mailbox backlog above threshold"
            );
        }
        Ok(())
    }

    /// Whether the consumer side is gone or tearing down
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Messages posted but not yet taken by the consumer
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Whether both handles feed the same mailbox
    pub fn same_mailbox(&self, other: &Receiver) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("name", &self.shared.name)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Consumer side of a mailbox, owned by exactly one actor.
///
/// Messages come out in the order they were posted, across all producers.
/// Dropping the mailbox, or calling [`close`](Mailbox::close), makes every
/// further post fail with `MailboxClosed`.
pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<ReceiverMessage>,
    handle: Receiver,
}

impl Mailbox {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_config(name, &MailboxConfig::default(), None)
    }

    pub fn with_config(
        name: impl Into<String>,
        config: &MailboxConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProtocolError::InvalidArgument(
                constants::ERR_EMPTY_RECEIVER_NAME.to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            name,
            pending: AtomicUsize::new(0),
            backlog_warning: config.backlog_warning.max(1),
            backlog_warned: AtomicBool::new(false),
            metrics,
        });

        Ok(Self {
            rx,
            handle: Receiver { tx, shared },
        })
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// A producer handle for this mailbox
    pub fn receiver(&self) -> Receiver {
        self.handle.clone()
    }

    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the mailbox is closed and empty.
    pub async fn recv(&mut self) -> Option<ReceiverMessage> {
        let message = self.rx.recv().await?;
        self.handle.shared.consumed();
        Some(message)
    }

    /// Take the next message if one is already queued
    pub fn try_recv(&mut self) -> Option<ReceiverMessage> {
        match self.rx.try_recv() {
            Ok(message) => {
                self.handle.shared.consumed();
                Some(message)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocking variant of [`recv`](Mailbox::recv) for actors running on their own
    /// OS thread. Panics if called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ReceiverMessage> {
        let message = self.rx.blocking_recv()?;
        self.handle.shared.consumed();
        Some(message)
    }

    /// Take every message queued right now, in order, without waiting
    pub fn drain(&mut self) -> Vec<ReceiverMessage> {
        let mut out = Vec::new();
        while let Some(message) = self.try_recv() {
            out.push(message);
        }
        out
    }

    /// Begin teardown: refuse new posts, keep already-queued messages readable
    pub fn close(&mut self) {
        if !self.handle.tx.is_closed() {
            debug!(mailbox = %self.handle.shared.name, "Mailbox closing");
        }
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.tx.is_closed()
    }

    /// Consume the mailbox as a stream of messages
    pub fn into_stream(self) -> impl Stream<Item = ReceiverMessage> + Send + 'static {
        let shared = self.handle.shared.clone();
        UnboundedReceiverStream::new(self.rx).inspect(move |_| shared.consumed())
    }

    /// Process messages one at a time until the handler breaks or the mailbox ends.
    ///
    /// A handler error goes to [`MessageHandler::on_error`] and the loop carries on
    /// with the next message. The mailbox is closed when the loop returns.
    #[instrument(skip(self, handler), fields(mailbox = %self.handle.shared.name))]
    pub async fn run<H: MessageHandler>(mut self, handler: &mut H) {
        while let Some(message) = self.recv().await {
            match handler.handle(message) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => break,
                Err(e) => handler.on_error(e, &self.handle),
            }
        }
        self.close();
        debug!("Mailbox consumer stopped");
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("name", &self.handle.shared.name)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Single-threaded message processing driven by [`Mailbox::run`]
pub trait MessageHandler: Send {
    fn handle(&mut self, message: ReceiverMessage) -> Result<ControlFlow<()>>;

    /// Called with the error of a failed `handle`.
    ///
    /// `mailbox` posts back into the mailbox being drained, e.g. to turn the
    /// failure into a `WorkerException` envelope.
    fn on_error(&mut self, error: ProtocolError, mailbox: &Receiver) {
        warn!(mailbox = %mailbox.name(), error = %error, "Message handler failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(worker: &str) -> ReceiverMessage {
        ReceiverMessage::worker_finished(worker).unwrap()
    }

    fn worker_of(message: &ReceiverMessage) -> &str {
        match message {
            ReceiverMessage::WorkerFinished(m) => m.worker(),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut mailbox = Mailbox::new("agent-1").unwrap();
        let receiver = mailbox.receiver();
        for name in ["a", "b", "c"] {
            receiver.post_message(finished(name)).unwrap();
        }
        assert_eq!(mailbox.pending(), 3);

        let order: Vec<String> = mailbox
            .drain()
            .iter()
            .map(|m| worker_of(m).to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(mailbox.pending(), 0);
    }

    #[test]
    fn test_post_after_close_is_reported() {
        let mut mailbox = Mailbox::new("agent-2").unwrap();
        let receiver = mailbox.receiver();
        receiver.post_message(finished("before")).unwrap();

        mailbox.close();
        assert!(receiver.is_closed());
        assert!(matches!(
            receiver.post_message(finished("after")),
            Err(ProtocolError::MailboxClosed(name)) if name == "agent-2"
        ));

        // queued before teardown stays readable
        assert_eq!(worker_of(&mailbox.try_recv().unwrap()), "before");
        assert!(mailbox.try_recv().is_none());
    }

    #[test]
    fn test_post_after_drop_is_reported() {
        let mailbox = Mailbox::new("agent-3").unwrap();
        let receiver = mailbox.receiver();
        drop(mailbox);
        assert!(receiver.post_message(finished("late")).is_err());
        assert_eq!(receiver.pending(), 0);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            Mailbox::new(""),
            Err(ProtocolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_metrics_counted() {
        let metrics = Arc::new(Metrics::new());
        let mut mailbox =
            Mailbox::with_config("m", &MailboxConfig::default(), Some(metrics.clone())).unwrap();
        let receiver = mailbox.receiver();
        receiver.post_message(finished("x")).unwrap();
        mailbox.close();
        let _ = receiver.post_message(finished("y"));

        let snap = metrics.snapshot();
        assert_eq!(snap.mailbox_posts, 1);
        assert_eq!(snap.mailbox_rejections, 1);
    }

    struct Collect {
        seen: Vec<String>,
    }

    impl MessageHandler for Collect {
        fn handle(&mut self, message: ReceiverMessage) -> Result<ControlFlow<()>> {
            let worker = worker_of(&message).to_string();
            if worker == "bad" {
                return Err(ProtocolError::Custom("cannot handle".into()));
            }
            if worker == "stop" {
                return Ok(ControlFlow::Break(()));
            }
            self.seen.push(worker);
            Ok(ControlFlow::Continue(()))
        }
    }

    #[tokio::test]
    async fn test_run_survives_handler_errors() {
        let mailbox = Mailbox::new("runner").unwrap();
        let receiver = mailbox.receiver();
        for name in ["one", "bad", "two", "stop", "never"] {
            receiver.post_message(finished(name)).unwrap();
        }

        let mut handler = Collect { seen: Vec::new() };
        mailbox.run(&mut handler).await;

        assert_eq!(handler.seen, vec!["one", "two"]);
        assert!(receiver.is_closed());
    }
}
