//! # Payload Serialization
//!
//! Packets carry opaque bytes. This module puts typed values inside them with a
//! one-byte format prefix so the receiving side can decode without negotiation.
//!
//! ## Formats
//! - **Bincode**: compact binary (default)
//! - **JSON**: human-readable, for debugging and interop
//!
//! ## Usage
//! ```rust
//! use simnet::core::packet::Packet;
//! use simnet::core::serialization::SerializationFormat;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Move { agent: u32, x: i32, y: i32 }
//!
//! let packet = Packet::from_value(&Move { agent: 7, x: 1, y: -2 }, SerializationFormat::Bincode).unwrap();
//! let (value, format): (Move, _) = packet.to_value().unwrap();
//! assert_eq!(value, Move { agent: 7, x: 1, y: -2 });
//! assert_eq!(format, SerializationFormat::Bincode);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};

/// Supported payload encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializationFormat {
    /// Binary compact format (default, fastest)
    #[default]
    Bincode,
    /// Human-readable JSON format (debugging, interop)
    Json,
}

impl SerializationFormat {
    /// Get the format identifier byte for the payload prefix
    pub fn format_byte(self) -> u8 {
        match self {
            SerializationFormat::Bincode => 0x01,
            SerializationFormat::Json => 0x02,
        }
    }

    /// Detect format from identifier byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(SerializationFormat::Bincode),
            0x02 => Some(SerializationFormat::Json),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Bincode => "Bincode",
            SerializationFormat::Json => "JSON",
        }
    }
}

/// Types that can be written into and read from a payload in any supported format
pub trait MultiFormat: Serialize + DeserializeOwned + Sized {
    /// Serialize to bytes using the specified format
    fn serialize_format(&self, format: SerializationFormat) -> Result<Vec<u8>> {
        match format {
            SerializationFormat::Bincode => {
                bincode::serialize(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            SerializationFormat::Json => {
                serde_json::to_vec(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
        }
    }

    /// Serialize to bytes with format header
    fn serialize_with_header(&self, format: SerializationFormat) -> Result<Vec<u8>> {
        let mut data = vec![format.format_byte()];
        let mut payload = self.serialize_format(format)?;
        data.append(&mut payload);
        Ok(data)
    }

    /// Deserialize from bytes using the specified format
    fn deserialize_format(data: &[u8], format: SerializationFormat) -> Result<Self> {
        match format {
            SerializationFormat::Bincode => bincode::deserialize(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            SerializationFormat::Json => serde_json::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
        }
    }

    /// Deserialize from bytes with format header
    fn deserialize_with_header(data: &[u8]) -> Result<(Self, SerializationFormat)> {
        let (&first, rest) = data.split_first().ok_or_else(|| {
            ProtocolError::DeserializeError(constants::ERR_EMPTY_PAYLOAD.to_string())
        })?;

        let format = SerializationFormat::from_byte(first).ok_or_else(|| {
            ProtocolError::DeserializeError(format!("Unknown format byte: {first}"))
        })?;

        let value = Self::deserialize_format(rest, format)?;
        Ok((value, format))
    }
}

impl<T> MultiFormat for T where T: Serialize + DeserializeOwned {}

impl Packet {
    /// Build a packet whose payload is `value` encoded in `format`
    pub fn from_value<T: MultiFormat>(value: &T, format: SerializationFormat) -> Result<Self> {
        Ok(Packet::new(value.serialize_with_header(format)?))
    }

    /// Decode the payload as a `T`, reporting the format it was written in
    pub fn to_value<T: MultiFormat>(&self) -> Result<(T, SerializationFormat)> {
        T::deserialize_with_header(self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Spawn {
        template: String,
        count: u16,
    }

    #[test]
    fn test_format_byte_roundtrip() {
        for format in [SerializationFormat::Bincode, SerializationFormat::Json] {
            let recovered = SerializationFormat::from_byte(format.format_byte());
            assert_eq!(Some(format), recovered);
        }
        assert_eq!(SerializationFormat::from_byte(0x7F), None);
    }

    #[test]
    fn test_default_format() {
        assert_eq!(SerializationFormat::default(), SerializationFormat::Bincode);
        assert_eq!(SerializationFormat::Json.name(), "JSON");
    }

    #[test]
    fn test_json_payload_is_readable() {
        let spawn = Spawn {
            template: "wolf".into(),
            count: 3,
        };
        let packet = Packet::from_value(&spawn, SerializationFormat::Json).unwrap();
        assert_eq!(packet.payload()[0], 0x02);
        assert!(std::str::from_utf8(&packet.payload()[1..])
            .unwrap()
            .contains("wolf"));

        let (back, format): (Spawn, _) = packet.to_value().unwrap();
        assert_eq!(back, spawn);
        assert_eq!(format, SerializationFormat::Json);
    }

    #[test]
    fn test_empty_and_unknown_payloads_fail() {
        assert!(matches!(
            Packet::new(Vec::new()).to_value::<Spawn>(),
            Err(ProtocolError::DeserializeError(_))
        ));
        assert!(matches!(
            Packet::new(vec![0x09, 1, 2]).to_value::<Spawn>(),
            Err(ProtocolError::DeserializeError(_))
        ));
    }
}
