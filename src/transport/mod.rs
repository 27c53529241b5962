//! # Transport Layer
//!
//! Sessions and the sockets that feed them.
//!
//! ## Components
//! - **Session**: one live connection, its counters and its I/O task
//! - **Handler**: [`SessionHandler`] callbacks fired by every session
//! - **TCP**: listener and connector that open sessions over TCP streams
//!
//! Any `AsyncRead + AsyncWrite` stream can carry a session; [`tcp`] is the
//! stock way to get one.

pub mod handler;
pub mod session;
pub mod tcp;

pub use handler::{MailboxForwarder, SessionHandler, SessionHandlerAdapter};
pub use session::{Session, SessionFactory, SessionOptions, SessionState};
pub use tcp::{connect, connect_with_config, TcpServer};
