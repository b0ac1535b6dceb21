//! Layer-3 message header
//!
//! Every signalling message starts with the same 4-byte header:
//!
//! ```text
//! +-----------------+-----------------+------------------+------------------+
//! | PD (4) | TI (4) |  Message type   |    Reserved      |    Reserved      |
//! |    (1 byte)     |    (1 byte)     |    (1 byte)      |    (1 byte)      |
//! +-----------------+-----------------+------------------+------------------+
//! ```
//!
//! The low nibble holds the transaction identifier (CC/SM and friends) or
//! the skip indicator (MM/GMM/RR). NAS messages carried in a direct transfer
//! are prefixed by a one byte CN-domain tag, see [`DomainTag`].

use bytes::{Buf, BufMut};
use thiserror::Error;
use umtsim_common::CnDomain;

use crate::enums::ProtocolDiscriminator;

/// Header decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("Buffer too short: expected at least {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Invalid protocol discriminator: 0x{0:X}")]
    InvalidProtocolDiscriminator(u8),

    #[error("Invalid CN domain tag: {0}")]
    InvalidDomain(u8),
}

/// Transaction identifier (TS 24.007 11.2.3.1.3)
///
/// `value` is the 3-bit identifier. `flag` is clear on messages sent by the
/// side that originated the transaction and set on messages sent by the
/// other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId {
    pub value: u8,
    pub flag: bool,
}

impl TransactionId {
    /// Highest usable identifier value; 7 is reserved for extension.
    pub const MAX_VALUE: u8 = 6;

    pub const fn new(value: u8, flag: bool) -> Self {
        Self { value: value & 0x07, flag }
    }

    /// Decodes from the 4-bit header field.
    pub const fn from_nibble(nibble: u8) -> Self {
        Self {
            value: nibble & 0x07,
            flag: nibble & 0x08 != 0,
        }
    }

    /// Encodes into the 4-bit header field.
    pub const fn to_nibble(self) -> u8 {
        (self.value & 0x07) | if self.flag { 0x08 } else { 0 }
    }
}

/// The 4-byte Layer-3 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L3Header {
    /// Transaction identifier or skip indicator (4 bits)
    pub ti_spd: u8,
    /// Protocol discriminator
    pub pd: ProtocolDiscriminator,
    /// Message type code
    pub msg_type: u8,
}

impl L3Header {
    /// Encoded header size in bytes
    pub const SIZE: usize = 4;

    pub fn new(pd: ProtocolDiscriminator, ti_spd: u8, msg_type: u8) -> Self {
        Self {
            ti_spd: ti_spd & 0x0F,
            pd,
            msg_type,
        }
    }

    /// Transaction identifier view of the low nibble.
    pub fn transaction_id(&self) -> TransactionId {
        TransactionId::from_nibble(self.ti_spd)
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, HeaderError> {
        if buf.remaining() < Self::SIZE {
            return Err(HeaderError::BufferTooShort {
                expected: Self::SIZE,
                actual: buf.remaining(),
            });
        }

        let first = buf.get_u8();
        let pd_bits = first >> 4;
        let pd = ProtocolDiscriminator::try_from(pd_bits)
            .map_err(|_| HeaderError::InvalidProtocolDiscriminator(pd_bits))?;
        let msg_type = buf.get_u8();
        // reserved
        buf.advance(2);

        Ok(Self {
            ti_spd: first & 0x0F,
            pd,
            msg_type,
        })
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8((u8::from(self.pd) << 4) | (self.ti_spd & 0x0F));
        buf.put_u8(self.msg_type);
        buf.put_u16(0);
    }
}

/// One byte CN-domain tag prepended to NAS messages inside a direct transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainTag(pub CnDomain);

impl DomainTag {
    pub const SIZE: usize = 1;

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, HeaderError> {
        if buf.remaining() < Self::SIZE {
            return Err(HeaderError::BufferTooShort {
                expected: Self::SIZE,
                actual: buf.remaining(),
            });
        }
        let v = buf.get_u8();
        CnDomain::try_from(v)
            .map(DomainTag)
            .map_err(|_| HeaderError::InvalidDomain(v))
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.0.into());
    }
}
