//! # Frame Codec
//!
//! [`PacketCodec`] implements tokio's `Decoder`/`Encoder` for the frame format and
//! can drive a `Framed` stream on its own. Sessions use the two stateful halves
//! built on top of it:
//!
//! - [`Fetcher`]: accumulates raw reads and yields every complete [`Packet`],
//!   keeping the unconsumed tail for the next call.
//! - [`Separator`]: turns one packet into write-sized byte chunks.
//!
//! Feeding the concatenated output of `separate` back into `fetch` yields the
//! original packet, however the bytes are split across calls.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::config::{HEADER_LEN, MAX_CHUNK_SIZE, MAX_PAYLOAD_SIZE};
use crate::core::packet::{parse_header, Packet};
use crate::error::{constants, ProtocolError, Result, Violation};

/// Length-prefixed frame codec with a payload size ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketCodec {
    max_payload_size: usize,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl PacketCodec {
    pub fn new(max_payload_size: usize) -> Result<Self> {
        if max_payload_size == 0 {
            return Err(ProtocolError::InvalidArgument(
                constants::ERR_ZERO_PAYLOAD_LIMIT.to_string(),
            ));
        }
        Ok(Self { max_payload_size })
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    fn check_outgoing(&self, packet: &Packet) -> Result<()> {
        if packet.len() > self.max_payload_size || packet.len() > u32::MAX as usize {
            return Err(Violation::Oversized {
                len: packet.len(),
                max: self.max_payload_size,
            }
            .into());
        }
        Ok(())
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        let len = match parse_header(&src[..], self.max_payload_size)? {
            Some(len) => len,
            None => return Ok(None),
        };

        let total = HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Packet::new(payload)))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        <Self as Encoder<&Packet>>::encode(self, &item, dst)
    }
}

impl<'a> Encoder<&'a Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &'a Packet, dst: &mut BytesMut) -> Result<()> {
        self.check_outgoing(item)?;
        dst.reserve(item.encoded_len());
        item.put_header(dst);
        dst.extend_from_slice(item.payload());
        Ok(())
    }
}

/// Stream-to-packet half of a session's codec.
///
/// Implementations own the carry-over buffer; one instance serves one session.
pub trait Fetcher: Send {
    /// Append `incoming` and return every packet that is now complete, in order.
    ///
    /// Bytes of a trailing incomplete frame stay buffered. A framing violation
    /// clears the buffer, since the stream can no longer be resynchronized.
    fn fetch(&mut self, incoming: &[u8]) -> Result<Vec<Packet>>;

    /// Bytes currently held for an incomplete frame
    fn buffered(&self) -> usize;

    /// Discard any buffered bytes
    fn reset(&mut self);
}

/// Packet-to-chunks half of a session's codec.
pub trait Separator: Send {
    /// Serialize `packet` into one or more chunks whose concatenation is its frame.
    fn separate(&mut self, packet: &Packet) -> Result<Vec<Bytes>>;
}

/// [`Fetcher`] for length-prefixed frames
#[derive(Debug)]
pub struct FrameFetcher {
    codec: PacketCodec,
    carry: BytesMut,
}

impl FrameFetcher {
    pub fn new(codec: PacketCodec) -> Self {
        Self {
            codec,
            carry: BytesMut::new(),
        }
    }
}

impl Fetcher for FrameFetcher {
    fn fetch(&mut self, incoming: &[u8]) -> Result<Vec<Packet>> {
        self.carry.extend_from_slice(incoming);

        let mut packets = Vec::new();
        loop {
            match self.codec.decode(&mut self.carry) {
                Ok(Some(packet)) => packets.push(packet),
                Ok(None) => break,
                Err(e) => {
                    self.carry.clear();
                    return Err(e);
                }
            }
        }

        trace!(
            packets = packets.len(),
            retained = self.carry.len(),
            "Fetched packets"
        );
        Ok(packets)
    }

    fn buffered(&self) -> usize {
        self.carry.len()
    }

    fn reset(&mut self) {
        self.carry.clear();
    }
}

/// [`Separator`] for length-prefixed frames, splitting at `max_chunk_size`
#[derive(Debug, Clone)]
pub struct FrameSeparator {
    codec: PacketCodec,
    max_chunk_size: usize,
}

impl FrameSeparator {
    pub fn new(codec: PacketCodec, max_chunk_size: usize) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(ProtocolError::InvalidArgument(
                constants::ERR_ZERO_CHUNK_SIZE.to_string(),
            ));
        }
        Ok(Self {
            codec,
            max_chunk_size,
        })
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }
}

impl Default for FrameSeparator {
    fn default() -> Self {
        Self {
            codec: PacketCodec::default(),
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }
}

impl Separator for FrameSeparator {
    fn separate(&mut self, packet: &Packet) -> Result<Vec<Bytes>> {
        let mut frame = BytesMut::with_capacity(packet.encoded_len());
        Encoder::<&Packet>::encode(&mut self.codec, packet, &mut frame)?;

        // split_to on frozen bytes shares the allocation
        let mut frame = frame.freeze();
        let mut chunks = Vec::with_capacity(frame.len().div_ceil(self.max_chunk_size));
        while !frame.is_empty() {
            let n = frame.len().min(self.max_chunk_size);
            chunks.push(frame.split_to(n));
        }
        Ok(chunks)
    }
}
