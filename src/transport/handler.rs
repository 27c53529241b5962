//! Session event callbacks.
//!
//! Callbacks run on the session's I/O task. They must return quickly: anything
//! long-running belongs in a receiver mailbox, which is what
//! [`MailboxForwarder`] does for incoming packets.

use tracing::{debug, warn};

use crate::core::packet::Packet;
use crate::error::ProtocolError;
use crate::receiver::{Receiver, ReceiverMessage};
use crate::transport::session::Session;

/// Lifecycle and data events of a session.
///
/// Every method has an empty default body, so implementors override only what
/// they care about. For a session the order is `session_created`,
/// `session_opened`, then any number of data events, then `session_closed`
/// exactly once. A fatal error shows up as `exception_caught` before
/// `session_closed`.
pub trait SessionHandler: Send + Sync + 'static {
    fn session_created(&self, _session: &Session) {}

    fn session_opened(&self, _session: &Session) {}

    fn session_closed(&self, _session: &Session) {}

    fn exception_caught(&self, _session: &Session, _cause: &ProtocolError) {}

    fn message_received(&self, _session: &Session, _message: Packet) {}

    fn message_sent(&self, _session: &Session, _message: &Packet) {}
}

/// Handler that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionHandlerAdapter;

impl SessionHandler for SessionHandlerAdapter {}

/// Posts every received packet into a receiver as a `Network` envelope.
///
/// If the receiver's mailbox is gone the session is closed gracefully, since
/// nothing is left to consume its traffic.
#[derive(Debug, Clone)]
pub struct MailboxForwarder {
    receiver: Receiver,
}

impl MailboxForwarder {
    pub fn new(receiver: Receiver) -> Self {
        Self { receiver }
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }
}

impl SessionHandler for MailboxForwarder {
    fn exception_caught(&self, session: &Session, cause: &ProtocolError) {
        warn!(session = session.id(), error = %cause, "Session failed");
    }

    fn message_received(&self, session: &Session, message: Packet) {
        let envelope = ReceiverMessage::network(session.clone(), message);
        if let Err(e) = self.receiver.post_message(envelope) {
            debug!(session = session.id(), error = %e, "Receiver gone, closing session");
            session.close(false);
        }
    }
}
