//! # Core Framing Components
//!
//! Packets, the frame codec, and payload serialization.
//!
//! This module turns a byte stream into discrete packets and back. It knows
//! nothing about sockets: sessions feed it bytes and write out what it returns.
//!
//! ## Components
//! - **Packet**: Immutable, complete unit of application data
//! - **Codec**: Tokio codec plus the per-session [`Fetcher`](codec::Fetcher) and
//!   [`Separator`](codec::Separator) built on it
//! - **Serialization**: Typed payloads inside a packet
//!
//! ## Wire Format
//! ```text
//! [Magic(4) "SIMN"] [Version(1)] [Length(4), big-endian] [Payload(N)]
//! ```
//!
//! ## Limits
//! - Maximum payload size is configurable (16MB by default)
//! - Header is validated before any payload allocation

pub mod codec;
pub mod packet;
pub mod serialization;
