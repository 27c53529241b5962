use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::config::TransportConfig;
use crate::core::codec::{Fetcher, FrameFetcher, FrameSeparator, PacketCodec, Separator};
use crate::error::{constants, ProtocolError, Result};

/// Transports known to this build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("tcp") {
            Ok(TransportKind::Tcp)
        } else {
            Err(ProtocolError::UnsupportedProtocol(s.to_string()))
        }
    }
}

/// Factory for the per-session codec halves of one transport.
///
/// Every call to `create_fetcher`/`create_separator` must return a fresh
/// instance: the carry-over buffer is per connection.
pub trait Protocol: Send + Sync + fmt::Debug {
    /// Registry key, matched case-insensitively
    fn name(&self) -> &str;

    fn create_fetcher(&self) -> Box<dyn Fetcher>;

    fn create_separator(&self) -> Box<dyn Separator>;
}

/// Length-prefixed framing over a reliable byte stream
#[derive(Debug, Clone, Default)]
pub struct TcpProtocol {
    codec: PacketCodec,
    separator: FrameSeparator,
}

impl TcpProtocol {
    pub fn new(max_payload_size: usize, max_chunk_size: usize) -> Result<Self> {
        let codec = PacketCodec::new(max_payload_size)?;
        let separator = FrameSeparator::new(codec, max_chunk_size)?;
        Ok(Self { codec, separator })
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        Self::new(config.max_payload_size, config.max_chunk_size)
    }

    pub fn max_payload_size(&self) -> usize {
        self.codec.max_payload_size()
    }

    pub fn max_chunk_size(&self) -> usize {
        self.separator.max_chunk_size()
    }
}

impl Protocol for TcpProtocol {
    fn name(&self) -> &str {
        TransportKind::Tcp.as_str()
    }

    fn create_fetcher(&self) -> Box<dyn Fetcher> {
        Box::new(FrameFetcher::new(self.codec))
    }

    fn create_separator(&self) -> Box<dyn Separator> {
        Box::new(self.separator.clone())
    }
}

/// Name → protocol table.
///
/// Built once, then shared (typically behind an `Arc`). Lookups hand out the
/// same `Arc<dyn Protocol>` every time, so two lookups of one transport compare
/// equal with `Arc::ptr_eq`.
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    protocols: HashMap<String, Arc<dyn Protocol>>,
}

impl ProtocolRegistry {
    /// An empty registry, for tests that install fake transports
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every built-in transport, configured from `config`
    pub fn with_defaults(config: &TransportConfig) -> Result<Self> {
        let mut registry = Self::empty();
        registry.register(Arc::new(TcpProtocol::from_config(config)?))?;
        Ok(registry)
    }

    /// Add a transport under its own name.
    ///
    /// Fails with `InvalidArgument` if the name is blank or already taken.
    pub fn register(&mut self, protocol: Arc<dyn Protocol>) -> Result<()> {
        let key = protocol.name().trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(ProtocolError::InvalidArgument(
                constants::ERR_EMPTY_PROTOCOL_NAME.to_string(),
            ));
        }
        if self.protocols.contains_key(&key) {
            return Err(ProtocolError::InvalidArgument(format!(
                "{}: {key}",
                constants::ERR_REGISTRY_DUPLICATE
            )));
        }

        debug!(protocol = %key, "Registered transport");
        self.protocols.insert(key, protocol);
        Ok(())
    }

    /// Case-insensitive lookup; `None` for an unknown name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Protocol>> {
        self.protocols
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
    }

    /// Lookup by enumerated transport
    pub fn get_kind(&self, kind: TransportKind) -> Option<Arc<dyn Protocol>> {
        self.get(kind.as_str())
    }

    /// Like [`get`](Self::get) but reports an unknown name as `UnsupportedProtocol`
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Protocol>> {
        self.get(name)
            .ok_or_else(|| ProtocolError::UnsupportedProtocol(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.protocols.keys().cloned().collect();
        names.sort();
        names
    }
}
