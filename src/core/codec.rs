//! Tokio codec framing envelopes over a byte stream.
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [Length(4)] [Payload(N)]
//! ```
//!
//! Payload is the bincode encoding of an [`Envelope`]. Length is validated
//! against the configured maximum before any allocation happens, and the
//! magic bytes keep a misdirected stream from being misinterpreted as
//! protocol traffic.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::{MAGIC_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::core::packet::Envelope;
use crate::error::ClientError;

/// Frame header size: magic + version + length
const HEADER_LEN: usize = 4 + 1 + 4;

/// Length-prefixed bincode codec for [`Envelope`] frames.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_payload_size: usize,
}

impl EnvelopeCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = ClientError;

    fn encode(&mut self, envelope: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(&envelope)?;

        if payload.len() > self.max_payload_size {
            return Err(ClientError::OversizedPacket(payload.len()));
        }

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_slice(&MAGIC_BYTES);
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);

        Ok(())
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = ClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        if src[0..4] != MAGIC_BYTES {
            return Err(ClientError::InvalidHeader);
        }

        let version = src[4];
        if version != PROTOCOL_VERSION {
            return Err(ClientError::UnsupportedVersion(version));
        }

        let length = u32::from_be_bytes([src[5], src[6], src[7], src[8]]) as usize;
        if length > self.max_payload_size {
            return Err(ClientError::OversizedPacket(length));
        }

        if src.len() < HEADER_LEN + length {
            // Partial frame; ask for more bytes
            src.reserve(HEADER_LEN + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(length);
        let envelope = bincode::deserialize(&payload)?;

        Ok(Some(envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{Payload, SERVER_IDENTITY};
    use uuid::Uuid;

    fn heartbeat() -> Envelope {
        Envelope::new(Uuid::new_v4(), Payload::Heartbeat)
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut codec = EnvelopeCodec::default();
        let mut buf = BytesMut::new();

        let envelope = heartbeat();
        codec.encode(envelope.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, envelope);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_yields_none() {
        let mut codec = EnvelopeCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(heartbeat(), &mut buf).unwrap();

        let mut partial = buf.split_to(buf.len() - 3);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut codec = EnvelopeCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(heartbeat(), &mut buf).unwrap();
        buf[0] = 0xFF;

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ClientError::InvalidHeader)
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut codec = EnvelopeCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(heartbeat(), &mut buf).unwrap();
        buf[4] = PROTOCOL_VERSION + 1;

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ClientError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn declared_length_over_limit_is_rejected() {
        let mut codec = EnvelopeCodec::new(64);
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC_BYTES);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u32(65);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ClientError::OversizedPacket(65))
        ));
    }

    #[test]
    fn two_frames_in_one_buffer() {
        let mut codec = EnvelopeCodec::default();
        let mut buf = BytesMut::new();

        let first = Envelope::new(SERVER_IDENTITY, Payload::Heartbeat);
        let second = heartbeat();
        codec.encode(first.clone(), &mut buf).unwrap();
        codec.encode(second.clone(), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), second);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
