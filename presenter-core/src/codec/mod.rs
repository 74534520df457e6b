//! Frame codec for the presenter wire format.
//!
//! ```text
//! [u32 BE] total_frame_length      (includes these 4 bytes)
//! [u8]     name_length
//! [..]     message type name (utf-8)
//! [..]     bincode payload
//! -- outbound only, zero or more TLV records:
//! [u32 BE] tag  [u32 BE] length  [length bytes of raw value]
//! ```
//!
//! TLV values are never copied by the codec; only their 8-byte header is
//! produced here and the caller writes the value itself.

use std::marker::PhantomData;

use bincode::Options;
use bytes::{Buf, BufMut, BytesMut};

use crate::error::PresenterError;
use crate::message::{Tlv, WireMessage};

/// Size of the big-endian total-length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of an encoded TLV tag/length header.
pub const TLV_HEADER_SIZE: usize = 8;

/// Largest frame body accepted on receive (10 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

const MAX_NAME_LEN: usize = u8::MAX as usize;

pub type TlvHeaderBytes = [u8; TLV_HEADER_SIZE];

/// Encodes and decodes frames carrying messages of type `M`.
#[derive(Debug)]
pub struct MessageCodec<M> {
    max_frame_size: usize,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Clone for MessageCodec<M> {
    fn clone(&self) -> Self {
        Self::with_max_frame_size(self.max_frame_size)
    }
}

impl<M> Default for MessageCodec<M> {
    fn default() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }
}

fn wire_options(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
        .with_limit(limit as u64)
        .reject_trailing_bytes()
}

impl<M> MessageCodec<M> {
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _marker: PhantomData,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Validate a received length prefix and return the body size that
    /// follows it.
    ///
    /// A body of zero bytes, a prefix smaller than itself, or a body over
    /// the configured maximum is rejected before anything is allocated.
    pub fn frame_remaining(&self, total_size: u32) -> Result<usize, PresenterError> {
        let remaining = (total_size as usize)
            .checked_sub(LENGTH_PREFIX_SIZE)
            .filter(|r| *r > 0)
            .ok_or(PresenterError::MalformedFrame { total_size })?;
        if remaining > self.max_frame_size {
            return Err(PresenterError::FrameTooLarge {
                size: remaining,
                max: self.max_frame_size,
            });
        }
        Ok(remaining)
    }

    /// Serialize a TLV tag and length into the fixed 8-byte header.
    pub fn encode_tlv_header(&self, tlv: &Tlv<'_>) -> TlvHeaderBytes {
        let mut header: TlvHeaderBytes = [0; TLV_HEADER_SIZE];
        header[0..4].copy_from_slice(&tlv.tag().to_be_bytes());
        header[4..8].copy_from_slice(&tlv.length().to_be_bytes());
        header
    }
}

impl<M: WireMessage> MessageCodec<M> {
    /// Serialize `message` into a complete length-prefixed frame.
    pub fn encode_message(&self, message: &M) -> Result<BytesMut, PresenterError> {
        let name = message.name();
        if name.len() > MAX_NAME_LEN {
            return Err(PresenterError::Encoding(format!(
                "message name too long: {} bytes",
                name.len()
            )));
        }

        let payload_len = wire_options(self.max_frame_size).serialized_size(message)? as usize;
        let body_len = 1 + name.len() + payload_len;
        if body_len > self.max_frame_size {
            return Err(PresenterError::FrameTooLarge {
                size: body_len,
                max: self.max_frame_size,
            });
        }
        let total = LENGTH_PREFIX_SIZE + body_len;

        let mut buf = BytesMut::with_capacity(total);
        // body_len <= max_frame_size, and total fits the u32 prefix for any
        // sane limit; reject anything else instead of truncating.
        let total_u32 = u32::try_from(total).map_err(|_| PresenterError::FrameTooLarge {
            size: body_len,
            max: u32::MAX as usize - LENGTH_PREFIX_SIZE,
        })?;
        buf.put_u32(total_u32);
        buf.put_u8(name.len() as u8);
        buf.put_slice(name.as_bytes());
        wire_options(self.max_frame_size).serialize_into((&mut buf).writer(), message)?;
        Ok(buf)
    }

    /// Reconstruct one message from exactly one frame body.
    pub fn decode_message(&self, body: &[u8]) -> Result<M, PresenterError> {
        let (&name_len, rest) = body
            .split_first()
            .ok_or_else(|| PresenterError::Encoding("empty frame body".into()))?;
        let name_len = name_len as usize;
        if rest.len() < name_len {
            return Err(PresenterError::Encoding(format!(
                "truncated message name: need {name_len} bytes, have {}",
                rest.len()
            )));
        }
        let (name, payload) = rest.split_at(name_len);
        let name = std::str::from_utf8(name)
            .map_err(|e| PresenterError::Encoding(format!("message name is not utf-8: {e}")))?;

        let message: M = wire_options(self.max_frame_size).deserialize(payload)?;
        if message.name() != name {
            return Err(PresenterError::Encoding(format!(
                "message name mismatch: wire says {name}, payload is {}",
                message.name()
            )));
        }
        Ok(message)
    }
}

impl<M: WireMessage> tokio_util::codec::Decoder for MessageCodec<M> {
    type Item = M;
    type Error = PresenterError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let remaining = self.frame_remaining(u32::from_be_bytes(prefix))?;

        let frame_len = LENGTH_PREFIX_SIZE + remaining;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let body = src.split_to(remaining);
        self.decode_message(&body).map(Some)
    }
}

impl<M: WireMessage> tokio_util::codec::Encoder<M> for MessageCodec<M> {
    type Error = PresenterError;

    fn encode(&mut self, item: M, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = self.encode_message(&item)?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
