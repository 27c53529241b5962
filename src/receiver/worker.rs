//! Background computations that report back through a receiver.
//!
//! A worker runs on its own OS thread. Its outcome reaches the owning actor as
//! envelopes, never as a return value or a propagated panic:
//!
//! - success: `WorkerResult(payload)` then `WorkerFinished`
//! - error or panic: `WorkerException(cause)` then `WorkerFinished`

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::receiver::mailbox::Receiver;
use crate::receiver::message::{ReceiverMessage, WorkerError};

/// Run `job` on a new thread named `name`, posting its outcome to `receiver`.
///
/// Fails with `InvalidArgument` for a blank name, before any thread is started.
pub fn spawn_worker<F, T>(receiver: &Receiver, name: impl Into<String>, job: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() -> std::result::Result<T, WorkerError> + Send + 'static,
    T: Any + Send + Sync,
{
    let name = name.into();
    // validates the name up front
    ReceiverMessage::worker_finished(name.clone())?;

    let receiver = receiver.clone();
    let thread_name = name.clone();
    let handle = thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            debug!(worker = %name, "Worker started");

            let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(value)) => ReceiverMessage::worker_result(name.clone(), value),
                Ok(Err(cause)) => exception(&name, cause),
                Err(panic) => exception(&name, panic_message(panic.as_ref()).into()),
            };

            for message in [outcome, ReceiverMessage::worker_finished(name.clone())] {
                if let Err(e) = message.and_then(|m| receiver.post_message(m)) {
                    warn!(worker = %name, error = %e, "Worker outcome not delivered");
                    break;
                }
            }
        })
        .map_err(ProtocolError::Io)?;

    Ok(handle)
}

fn exception(worker: &str, cause: WorkerError) -> Result<ReceiverMessage> {
    match ReceiverMessage::worker_exception(worker, cause) {
        // an error with an empty description still has to reach the actor
        Err(ProtocolError::InvalidArgument(_)) => {
            ReceiverMessage::worker_exception(worker, "worker failed without a message")
        }
        other => other,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}
