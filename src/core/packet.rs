//! Packet definition and single-frame helpers.

use bytes::{BufMut, Bytes};

use crate::config::{HEADER_LEN, MAGIC_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::error::{ProtocolError, Result, Violation};

/// One complete, self-delimited unit of application data.
///
/// Packets are immutable; cloning shares the payload buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    payload: Bytes,
}

impl Packet {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Length of this packet once framed
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Write the frame header for this packet into `dst`
    pub(crate) fn put_header(&self, dst: &mut impl BufMut) {
        dst.put_slice(&MAGIC_BYTES);
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u32(self.payload.len() as u32);
    }

    /// Encode this packet as one contiguous frame
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.put_header(&mut out);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode exactly one complete frame.
    ///
    /// Unlike the streaming fetcher this rejects truncated input and trailing bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let len = match parse_header(data, MAX_PAYLOAD_SIZE)? {
            Some(len) => len,
            None => {
                return Err(ProtocolError::DeserializeError(format!(
                    "truncated frame header: {} bytes",
                    data.len()
                )))
            }
        };

        let total = HEADER_LEN + len;
        if data.len() != total {
            return Err(ProtocolError::DeserializeError(format!(
                "frame declares {total} bytes but {} were supplied",
                data.len()
            )));
        }

        Ok(Self::new(Bytes::copy_from_slice(&data[HEADER_LEN..])))
    }
}

impl From<Vec<u8>> for Packet {
    fn from(payload: Vec<u8>) -> Self {
        Self::new(payload)
    }
}

impl From<&'static [u8]> for Packet {
    fn from(payload: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(payload))
    }
}

/// Validate a frame header at the start of `buf`.
///
/// Returns `Ok(None)` while fewer than [`HEADER_LEN`] bytes are available and the
/// declared payload length once the header is complete and valid. A partial
/// magic prefix that already mismatches is rejected without waiting.
pub(crate) fn parse_header(buf: &[u8], max_payload_size: usize) -> Result<Option<usize>> {
    let magic_seen = buf.len().min(MAGIC_BYTES.len());
    if buf[..magic_seen] != MAGIC_BYTES[..magic_seen] {
        let mut magic = [0u8; 4];
        magic[..magic_seen].copy_from_slice(&buf[..magic_seen]);
        return Err(Violation::InvalidMagic(magic).into());
    }

    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    let version = buf[4];
    if version != PROTOCOL_VERSION {
        return Err(Violation::UnsupportedVersion(version).into());
    }

    let len = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) as usize;
    if len > max_payload_size {
        return Err(Violation::Oversized {
            len,
            max: max_payload_size,
        }
        .into());
    }

    Ok(Some(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let bytes = Packet::new(vec![0xAA, 0xBB]).to_bytes();
        assert_eq!(&bytes[..4], b"SIMN");
        assert_eq!(bytes[4], PROTOCOL_VERSION);
        assert_eq!(&bytes[5..9], &[0, 0, 0, 2]);
        assert_eq!(&bytes[9..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_from_bytes_rejects_trailing_data() {
        let mut bytes = Packet::new(vec![1, 2, 3]).to_bytes();
        bytes.push(0);
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(ProtocolError::DeserializeError(_))
        ));
    }

    #[test]
    fn test_partial_header_waits() {
        assert!(matches!(parse_header(b"SIM", 16), Ok(None)));
        assert!(matches!(parse_header(b"", 16), Ok(None)));
    }

    #[test]
    fn test_bad_magic_prefix_fails_early() {
        let err = parse_header(b"XY", 16).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ProtocolViolation(Violation::InvalidMagic([b'X', b'Y', 0, 0]))
        ));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut header = MAGIC_BYTES.to_vec();
        header.push(PROTOCOL_VERSION);
        header.extend_from_slice(&17u32.to_be_bytes());
        let err = parse_header(&header, 16).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ProtocolViolation(Violation::Oversized { len: 17, max: 16 })
        ));
    }
}
