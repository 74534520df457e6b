//! Structured messages and the TLV records that ride behind them.
//!
//! The channel treats a message as an opaque serializable unit with a
//! type name. Bulk payloads (image buffers) are attached as [`Tlv`]
//! records that borrow the caller's bytes for the duration of one send.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::PresenterError;

// ── WireMessage ──────────────────────────────────────────────────

/// A schema-typed message that can travel over a presenter channel.
///
/// The type name is written on the wire ahead of the body and checked on
/// decode, so a frame always identifies its own payload type.
pub trait WireMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Wire/diagnostic name of this message's concrete type.
    fn name(&self) -> &'static str;

    /// Build the keep-alive message sent by the channel supervisor.
    fn heartbeat() -> Self;
}

// ── Tlv ──────────────────────────────────────────────────────────

/// A tag-length-value record appended after a frame's message body.
///
/// The value is borrowed; it is written to the transport directly and
/// never copied into the encoded message.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    tag: u32,
    value: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Wrap `value` under `tag`.
    ///
    /// Fails when the value length does not fit the 32-bit length field.
    pub fn new(tag: u32, value: &'a [u8]) -> Result<Self, PresenterError> {
        if u32::try_from(value.len()).is_err() {
            return Err(PresenterError::InvalidParam("TLV value exceeds u32 length"));
        }
        Ok(Self { tag, value })
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn length(&self) -> u32 {
        // Checked in `new`.
        self.value.len() as u32
    }

    pub fn value(&self) -> &'a [u8] {
        self.value
    }
}

// ── PartialMessageWithTlvs ───────────────────────────────────────

/// A message plus an ordered list of TLV records, sent as one unit:
/// the encoded frame first, then each TLV header followed by its value.
#[derive(Debug, Clone)]
pub struct PartialMessageWithTlvs<'a, M> {
    message: &'a M,
    tlvs: Vec<Tlv<'a>>,
}

impl<'a, M: WireMessage> PartialMessageWithTlvs<'a, M> {
    /// A message with no TLVs attached.
    pub fn new(message: &'a M) -> Self {
        Self {
            message,
            tlvs: Vec::new(),
        }
    }

    /// Append a TLV record.
    pub fn with_tlv(mut self, tlv: Tlv<'a>) -> Self {
        self.tlvs.push(tlv);
        self
    }

    pub fn message(&self) -> &'a M {
        self.message
    }

    pub fn tlvs(&self) -> &[Tlv<'a>] {
        &self.tlvs
    }

    /// Total bytes of TLV values (headers excluded).
    pub fn tlv_payload_len(&self) -> usize {
        self.tlvs.iter().map(|t| t.value.len()).sum()
    }
}
