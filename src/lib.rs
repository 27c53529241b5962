//! # simnet
//!
//! Networking core for multi-agent simulations: framed packet transport over
//! byte streams, per-connection sessions, ordered receiver mailboxes, one-shot
//! timers and background workers that report back as messages.
//!
//! ## Architecture
//! ```text
//! socket ─▶ Session ─fetch─▶ Packet ─▶ SessionHandler ─▶ Receiver ─▶ Mailbox (actor)
//!                                                         ▲      ▲
//!                                               Timer ────┘      └──── Worker
//! ```
//!
//! ## Modules
//! - [`core`]: packets, the frame codec and typed payloads
//! - [`protocol`]: transport protocols and the registry that names them
//! - [`transport`]: sessions, handlers, TCP listener and connector
//! - [`receiver`]: mailboxes, envelopes and workers
//! - [`timer`]: one-shot timers delivered into mailboxes
//! - [`config`]: TOML and environment configuration
//! - [`utils`]: logging, metrics and timing helpers
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use simnet::config::NetworkConfig;
//! use simnet::protocol::ProtocolRegistry;
//! use simnet::receiver::Mailbox;
//! use simnet::transport::{MailboxForwarder, SessionFactory, TcpServer};
//!
//! # async fn run() -> simnet::Result<()> {
//! let config = NetworkConfig::default();
//! let registry = ProtocolRegistry::with_defaults(&config.transport)?;
//! let mailbox = Mailbox::new("server")?;
//! let handler = Arc::new(MailboxForwarder::new(mailbox.receiver()));
//! let factory = SessionFactory::from_config(&registry, &config.transport, handler)?;
//!
//! let server = TcpServer::bind(&config.server, factory).await?;
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod timer;
pub mod transport;
pub mod utils;

pub use crate::core::packet::Packet;
pub use crate::error::{ProtocolError, Result, Violation};
pub use crate::receiver::{Mailbox, Receiver, ReceiverMessage};
pub use crate::timer::{Timer, TimerManager};
pub use crate::transport::{Session, SessionHandler};
