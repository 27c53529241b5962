//! Envelopes delivered through a [`Mailbox`](super::Mailbox).

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::timer::Timer;
use crate::transport::session::Session;

/// Error type carried by [`WorkerException`]
pub type WorkerError = Box<dyn StdError + Send + Sync + 'static>;

/// Every event kind a receiver can be handed.
///
/// Envelopes are immutable once built. Consumers match on the variant:
///
/// ```rust,ignore
/// match message {
///     ReceiverMessage::Network(m) => apply(m.packet()),
///     ReceiverMessage::TimerFired(t) => tick(t.timer()),
///     ReceiverMessage::WorkerResult(r) => merge(r.downcast_ref::<Plan>()),
///     ReceiverMessage::WorkerException(e) => report(e.cause()),
///     ReceiverMessage::WorkerFinished(_) => {}
/// }
/// ```
#[derive(Debug, Clone)]
pub enum ReceiverMessage {
    Network(NetworkMessage),
    TimerFired(TimerFired),
    WorkerException(WorkerException),
    WorkerFinished(WorkerFinished),
    WorkerResult(WorkerResult),
}

impl ReceiverMessage {
    /// Wrap a packet that arrived on `session`
    pub fn network(session: Session, packet: Packet) -> Self {
        ReceiverMessage::Network(NetworkMessage { session, packet })
    }

    /// Timer-fired event referencing `timer`
    pub fn timer_fired(timer: &Timer) -> Self {
        ReceiverMessage::TimerFired(TimerFired {
            timer: timer.clone(),
        })
    }

    /// Failure reported by the worker named `worker`
    pub fn worker_exception(worker: impl Into<String>, cause: impl Into<WorkerError>) -> Result<Self> {
        let worker = require_worker_name(worker.into())?;
        let cause: WorkerError = cause.into();
        if cause.to_string().trim().is_empty() {
            return Err(ProtocolError::InvalidArgument(
                constants::ERR_EMPTY_CAUSE.to_string(),
            ));
        }
        Ok(ReceiverMessage::WorkerException(WorkerException {
            worker,
            cause: Arc::from(cause),
        }))
    }

    /// Completion notice for the worker named `worker`
    pub fn worker_finished(worker: impl Into<String>) -> Result<Self> {
        Ok(ReceiverMessage::WorkerFinished(WorkerFinished {
            worker: require_worker_name(worker.into())?,
        }))
    }

    /// Result produced by the worker named `worker`
    pub fn worker_result<T>(worker: impl Into<String>, payload: T) -> Result<Self>
    where
        T: Any + Send + Sync,
    {
        Ok(ReceiverMessage::WorkerResult(WorkerResult {
            worker: require_worker_name(worker.into())?,
            payload: Arc::new(payload),
        }))
    }

    /// Short variant name, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ReceiverMessage::Network(_) => "network",
            ReceiverMessage::TimerFired(_) => "timer_fired",
            ReceiverMessage::WorkerException(_) => "worker_exception",
            ReceiverMessage::WorkerFinished(_) => "worker_finished",
            ReceiverMessage::WorkerResult(_) => "worker_result",
        }
    }
}

fn require_worker_name(worker: String) -> Result<String> {
    if worker.trim().is_empty() {
        return Err(ProtocolError::InvalidArgument(
            constants::ERR_EMPTY_WORKER_NAME.to_string(),
        ));
    }
    Ok(worker)
}

/// A packet together with the session it arrived on
#[derive(Debug, Clone)]
pub struct NetworkMessage {
    session: Session,
    packet: Packet,
}

impl NetworkMessage {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn into_parts(self) -> (Session, Packet) {
        (self.session, self.packet)
    }
}

#[derive(Debug, Clone)]
pub struct TimerFired {
    timer: Timer,
}

impl TimerFired {
    pub fn timer(&self) -> &Timer {
        &self.timer
    }
}

#[derive(Debug, Clone)]
pub struct WorkerException {
    worker: String,
    cause: Arc<dyn StdError + Send + Sync + 'static>,
}

impl WorkerException {
    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerFinished {
    worker: String,
}

impl WorkerFinished {
    pub fn worker(&self) -> &str {
        &self.worker
    }
}

#[derive(Clone)]
pub struct WorkerResult {
    worker: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl WorkerResult {
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// The payload, if it is a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for WorkerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerResult")
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_result_downcast() {
        let msg = ReceiverMessage::worker_result("pathfinder", vec![3u32, 4]).unwrap();
        match msg {
            ReceiverMessage::WorkerResult(result) => {
                assert_eq!(result.worker(), "pathfinder");
                assert_eq!(result.downcast_ref::<Vec<u32>>(), Some(&vec![3, 4]));
                assert!(result.downcast_ref::<String>().is_none());
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(matches!(
            ReceiverMessage::worker_finished("  "),
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            ReceiverMessage::worker_result("", 1u8),
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            ReceiverMessage::worker_exception("solver", ""),
            Err(ProtocolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_exception_keeps_cause() {
        let msg = ReceiverMessage::worker_exception("solver", "diverged after 40 steps").unwrap();
        assert_eq!(msg.kind(), "worker_exception");
        if let ReceiverMessage::WorkerException(e) = msg {
            assert_eq!(e.worker(), "solver");
            assert_eq!(e.cause().to_string(), "diverged after 40 steps");
        }
    }
}
