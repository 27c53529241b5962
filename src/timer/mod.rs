//! # Timers
//!
//! One-shot delayed events delivered into a receiver's mailbox.
//!
//! A [`Timer`] is bound to one [`Receiver`] when the [`TimerManager`] creates
//! it. Scheduling arms a single alarm task on the runtime; when the deadline
//! passes the timer moves to the cancelled state and only then posts a
//! `TimerFired` envelope, so the consumer never sees a fired timer that still
//! claims to be scheduled and may schedule it again from inside its handler.
//!
//! ## State Machine
//! ```text
//! Idle ──schedule──▶ Scheduled ──deadline──▶ Cancelled { fired: true }
//!                        │
//!                        └──cancel()──────▶ Cancelled { fired: false }
//! ```
//! Scheduling while `Scheduled` is ignored. Scheduling from `Cancelled` arms a
//! new alarm.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{constants, ProtocolError, Result};
use crate::receiver::{Receiver, ReceiverMessage};
use crate::utils::metrics::Metrics;
use crate::utils::time::until_timestamp_millis;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Observable timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Idle,
    Scheduled,
    /// Terminal until rescheduled; `fired` tells a deadline apart from `cancel()`
    Cancelled { fired: bool },
}

enum TimerState {
    Idle,
    Scheduled {
        alarm: AbortHandle,
        generation: u64,
        deadline: Instant,
    },
    Cancelled {
        fired: bool,
    },
}

struct TimerInner {
    id: u64,
    receiver: Receiver,
    runtime: Handle,
    metrics: Option<Arc<Metrics>>,
    state: Mutex<TimerState>,
    generation: AtomicU64,
}

impl TimerInner {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        // the state is a plain enum, valid even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to a one-shot timer. Clones refer to the same timer.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The receiver this timer posts to
    pub fn receiver(&self) -> &Receiver {
        &self.inner.receiver
    }

    pub fn status(&self) -> TimerStatus {
        match *self.inner.lock() {
            TimerState::Idle => TimerStatus::Idle,
            TimerState::Scheduled { .. } => TimerStatus::Scheduled,
            TimerState::Cancelled { fired } => TimerStatus::Cancelled { fired },
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.status() == TimerStatus::Scheduled
    }

    /// True after `cancel()` or after the timer fired
    pub fn is_cancelled(&self) -> bool {
        matches!(self.status(), TimerStatus::Cancelled { .. })
    }

    pub fn has_fired(&self) -> bool {
        self.status() == TimerStatus::Cancelled { fired: true }
    }

    /// Time left until the pending deadline, if scheduled
    pub fn remaining(&self) -> Option<Duration> {
        match *self.inner.lock() {
            TimerState::Scheduled { deadline, .. } => {
                Some(deadline.saturating_duration_since(Instant::now()))
            }
            _ => None,
        }
    }

    /// Fire `delay_ms` milliseconds from now. Ignored while already scheduled.
    pub fn schedule_after(&self, delay_ms: u64) {
        self.schedule(Duration::from_millis(delay_ms));
    }

    /// Fire at `timestamp_ms` (milliseconds since the Unix epoch). Ignored while
    /// already scheduled; a deadline in the past fires right away.
    pub fn schedule_at(&self, timestamp_ms: u64) {
        self.schedule(until_timestamp_millis(timestamp_ms));
    }

    fn schedule(&self, delay: Duration) {
        let mut state = self.inner.lock();
        if matches!(*state, TimerState::Scheduled { .. }) {
            trace!(timer = self.inner.id, "Timer already scheduled, request ignored");
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let deadline = Instant::now() + delay;
        let timer = self.clone();
        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            timer.fire(generation);
        });

        *state = TimerState::Scheduled {
            alarm: task.abort_handle(),
            generation,
            deadline,
        };
        debug!(
            timer = self.inner.id,
            delay_ms = delay.as_millis() as u64,
            "Timer scheduled"
        );
    }

    /// Stop a pending alarm. Safe in any state.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        if let TimerState::Scheduled { alarm, .. } = &*state {
            alarm.abort();
            *state = TimerState::Cancelled { fired: false };
            debug!(timer = self.inner.id, "Timer cancelled");
        }
    }

    fn fire(&self, generation: u64) {
        {
            let mut state = self.inner.lock();
            match &*state {
                TimerState::Scheduled {
                    generation: current,
                    ..
                } if *current == generation => {
                    *state = TimerState::Cancelled { fired: true };
                }
                // cancelled, or superseded by a newer alarm, while this one woke up
                _ => return,
            }
        }

        if let Some(metrics) = &self.inner.metrics {
            metrics.timer_fired();
        }

        if let Err(e) = self
            .inner
            .receiver
            .post_message(ReceiverMessage::timer_fired(self))
        {
            warn!(timer = self.inner.id, error = %e, "Timer fired into a closed mailbox");
        }
    }

    /// Whether both handles refer to the same timer
    pub fn ptr_eq(&self, other: &Timer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Timer {}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.inner.id)
            .field("receiver", &self.inner.receiver.name())
            .field("status", &self.status())
            .finish()
    }
}

/// Hands out timers bound to receivers.
///
/// Keeps no table of live timers: each timer owns its alarm. Alarms run on the
/// runtime captured when the manager was built, so timers can be scheduled
/// from threads outside that runtime.
#[derive(Clone)]
pub struct TimerManager {
    runtime: Handle,
    metrics: Option<Arc<Metrics>>,
}

impl TimerManager {
    /// Manager bound to the runtime of the calling context
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| ProtocolError::Custom(constants::ERR_NO_RUNTIME.to_string()))?;
        Ok(Self::with_handle(runtime))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// A new idle timer that will post to `receiver`
    pub fn create_timer(&self, receiver: &Receiver) -> Timer {
        Timer {
            inner: Arc::new(TimerInner {
                id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
                receiver: receiver.clone(),
                runtime: self.runtime.clone(),
                metrics: self.metrics.clone(),
                state: Mutex::new(TimerState::Idle),
                generation: AtomicU64::new(0),
            }),
        }
    }
}

impl fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::Mailbox;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_and_reports_cancelled() {
        let mut mailbox = Mailbox::new("r").unwrap();
        let timers = TimerManager::new().unwrap();
        let timer = timers.create_timer(&mailbox.receiver());

        assert_eq!(timer.status(), TimerStatus::Idle);
        timer.schedule_after(50);
        assert!(timer.is_scheduled());

        tokio::time::sleep(Duration::from_millis(60)).await;

        let messages = mailbox.drain();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ReceiverMessage::TimerFired(fired) => assert_eq!(fired.timer(), &timer),
            other => panic!("unexpected envelope: {other:?}"),
        }
        assert!(timer.is_cancelled());
        assert!(timer.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_schedule_is_ignored() {
        let mut mailbox = Mailbox::new("r").unwrap();
        let timer = TimerManager::new()
            .unwrap()
            .create_timer(&mailbox.receiver());

        timer.schedule_after(100);
        timer.schedule_after(10);
        assert_eq!(timer.inner.generation.load(Ordering::Relaxed), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(mailbox.drain().is_empty());
        assert!(timer.is_scheduled());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(mailbox.drain().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let mut mailbox = Mailbox::new("r").unwrap();
        let timer = TimerManager::new()
            .unwrap()
            .create_timer(&mailbox.receiver());

        timer.cancel();
        assert_eq!(timer.status(), TimerStatus::Idle);

        timer.schedule_after(20);
        timer.cancel();
        timer.cancel();
        assert_eq!(timer.status(), TimerStatus::Cancelled { fired: false });

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(mailbox.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_after_cancel_ignores_stale_alarm() {
        let mut mailbox = Mailbox::new("r").unwrap();
        let timer = TimerManager::new()
            .unwrap()
            .create_timer(&mailbox.receiver());

        timer.schedule_after(10);
        timer.cancel();
        timer.schedule_after(30);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(mailbox.drain().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mailbox.drain().len(), 1);
        assert!(timer.has_fired());
    }

    #[test]
    fn test_manager_requires_runtime() {
        assert!(matches!(TimerManager::new(), Err(ProtocolError::Custom(_))));
    }
}
