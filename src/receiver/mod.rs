//! # Receivers
//!
//! A receiver is an ordered inbox owned by one logical consumer. Network
//! sessions, timers and worker threads post [`ReceiverMessage`] envelopes into
//! it from any thread; the owner takes them out one at a time, so everything it
//! does with them is single-threaded and needs no locking.
//!
//! ## Components
//! - **Mailbox**: the consumer side ([`Mailbox`]) and the cloneable producer
//!   handle ([`Receiver`])
//! - **Message**: the [`ReceiverMessage`] envelope and its variants
//! - **Worker**: runs a computation on its own thread and reports the outcome
//!   as envelopes
//!
//! ## Example
//! ```rust
//! use simnet::receiver::{Mailbox, ReceiverMessage};
//!
//! let mut mailbox = Mailbox::new("agent-7").unwrap();
//! let receiver = mailbox.receiver();
//!
//! std::thread::spawn(move || {
//!     receiver
//!         .post_message(ReceiverMessage::worker_finished("planner").unwrap())
//!         .unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! assert!(matches!(mailbox.try_recv(), Some(ReceiverMessage::WorkerFinished(_))));
//! ```

pub mod mailbox;
pub mod message;
pub mod worker;

pub use mailbox::{Mailbox, MessageHandler, Receiver};
pub use message::{
    NetworkMessage, ReceiverMessage, TimerFired, WorkerError, WorkerException, WorkerFinished,
    WorkerResult,
};
pub use worker::spawn_worker;
