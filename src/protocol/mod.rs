//! # Transport Protocols
//!
//! A [`Protocol`] is a factory for matched codec pairs: every session asks it for
//! its own [`Fetcher`](crate::core::codec::Fetcher) and
//! [`Separator`](crate::core::codec::Separator). The [`ProtocolRegistry`] maps
//! transport names to protocol instances.
//!
//! New transports are added by implementing [`Protocol`] and registering the
//! implementation when the registry is built.

pub mod registry;

pub use registry::{Protocol, ProtocolRegistry, TcpProtocol, TransportKind};
