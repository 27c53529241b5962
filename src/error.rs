//! # Error Types
//!
//! Error handling for the framing protocol, sessions, mailboxes and timers.
//!
//! ## Error Categories
//! - **I/O Errors**: Socket and file system failures
//! - **Protocol Violations**: Malformed or oversized frames (session-fatal)
//! - **Lookup Errors**: Unknown transport names
//! - **Argument Errors**: Invalid constructor input, rejected before anything is built
//! - **Mailbox Errors**: Posting to a receiver whose consumer is gone
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use simnet::error::{ProtocolError, Result};
//! use std::fs::File;
//! use std::io::Read;
//! use tracing::{info, error};
//!
//! fn read_file(path: &str) -> Result<String> {
//!     let mut file = File::open(path).map_err(ProtocolError::Io)?;
//!     let mut contents = String::new();
//!     file.read_to_string(&mut contents).map_err(ProtocolError::Io)?;
//!     Ok(contents)
//! }
//!
//! fn main() {
//!     match read_file("example.txt") {
//!         Ok(contents) => info!(contents, "Successfully read file"),
//!         Err(e) => error!(error=%e, "Error reading file"),
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Registry errors
    pub const ERR_REGISTRY_DUPLICATE: &str = "Protocol already registered";
    pub const ERR_EMPTY_PROTOCOL_NAME: &str = "Protocol name cannot be empty";

    /// Codec errors
    pub const ERR_ZERO_CHUNK_SIZE: &str = "Chunk size must be greater than 0";
    pub const ERR_ZERO_PAYLOAD_LIMIT: &str = "Maximum payload size must be greater than 0";
    pub const ERR_ZERO_READ_BUFFER: &str = "Read buffer size must be greater than 0";

    /// Mailbox errors
    pub const ERR_EMPTY_RECEIVER_NAME: &str = "Receiver name cannot be empty";
    pub const ERR_EMPTY_WORKER_NAME: &str = "Worker name cannot be empty";
    pub const ERR_EMPTY_CAUSE: &str = "Worker exception cause cannot be empty";

    /// Timer errors
    pub const ERR_NO_RUNTIME: &str = "No tokio runtime available for timers";

    /// Serialization errors
    pub const ERR_EMPTY_PAYLOAD: &str = "Empty payload";
}

/// Framing failures detected while decoding the byte stream.
///
/// Every variant is fatal for the session that produced the bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Violation {
    #[error("invalid magic bytes {0:02X?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),

    #[error("frame of {len} bytes exceeds maximum of {max} bytes")]
    Oversized { len: usize, max: usize },
}

// ProtocolError is the primary error type for all crate operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Serialization(#[from] bincode::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Mailbox closed: {0}")]
    MailboxClosed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_converts_into_protocol_error() {
        let err: ProtocolError = Violation::UnsupportedVersion(9).into();
        assert!(matches!(
            err,
            ProtocolError::ProtocolViolation(Violation::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = ProtocolError::from(Violation::Oversized { len: 20, max: 10 });
        assert_eq!(
            err.to_string(),
            "Protocol violation: frame of 20 bytes exceeds maximum of 10 bytes"
        );
        assert_eq!(
            ProtocolError::UnsupportedProtocol("udp".into()).to_string(),
            "Unsupported protocol: udp"
        );
    }
}
