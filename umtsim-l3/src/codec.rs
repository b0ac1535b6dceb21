//! Message body coding helpers
//!
//! Bodies use a compact fixed layout: big-endian integers, optional values
//! prefixed by a presence byte and lists prefixed by a one byte count.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use umtsim_common::{CnDomain, FlowClassifier, PlmnId, QosDescriptor, RegAreaId, TrafficClass};

use crate::enums::ProtocolDiscriminator;
use crate::header::{HeaderError, L3Header};

/// Error type for message encoding/decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Buffer does not have enough bytes for decoding
    #[error("Buffer too short: expected at least {expected} bytes, got {actual}")]
    BufferTooShort {
        /// Expected minimum bytes
        expected: usize,
        /// Actual bytes available
        actual: usize,
    },

    /// Invalid value encountered during decoding
    #[error("Invalid value for {field}: {value}")]
    InvalidValue {
        /// Field being decoded
        field: &'static str,
        /// Raw value found
        value: u32,
    },

    /// Message type code not known for the protocol
    #[error("Unknown {pd:?} message type 0x{msg_type:02X}")]
    UnknownMessageType {
        /// Protocol of the header
        pd: ProtocolDiscriminator,
        /// Raw message type
        msg_type: u8,
    },

    /// Message type known but not expected in this direction
    #[error("{pd:?} message type 0x{msg_type:02X} is not decodable in this direction")]
    UnexpectedMessage {
        /// Protocol of the header
        pd: ProtocolDiscriminator,
        /// Raw message type
        msg_type: u8,
    },

    /// Protocol discriminator does not match the decoder
    #[error("Protocol mismatch: expected {expected:?}, got {actual:?}")]
    ProtocolMismatch {
        /// Decoder protocol
        expected: ProtocolDiscriminator,
        /// Header protocol
        actual: ProtocolDiscriminator,
    },

    /// Header error
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// A Layer-3 message family sharing one protocol discriminator.
pub trait L3Message: Sized {
    /// Protocol discriminator of every message in the family
    const PD: ProtocolDiscriminator;

    /// Message type code written into the header
    fn message_type(&self) -> u8;

    /// Human readable message name for logs
    fn name(&self) -> &'static str;

    /// Writes the body (everything after the header)
    fn encode_body(&self, buf: &mut BytesMut);

    /// Reads the body of a message with the given type code
    fn decode_body(msg_type: u8, buf: &mut Bytes) -> CodecResult<Self>;

    /// Encodes header and body.
    fn encode(&self, ti_spd: u8) -> Bytes {
        let mut buf = BytesMut::with_capacity(L3Header::SIZE + 16);
        L3Header::new(Self::PD, ti_spd, self.message_type()).encode(&mut buf);
        self.encode_body(&mut buf);
        buf.freeze()
    }

    /// Decodes a body whose header has already been read.
    fn decode_with_header(header: &L3Header, body: &mut Bytes) -> CodecResult<Self> {
        if header.pd != Self::PD {
            return Err(CodecError::ProtocolMismatch {
                expected: Self::PD,
                actual: header.pd,
            });
        }
        Self::decode_body(header.msg_type, body)
    }

    /// Decodes header and body, returning the header as well.
    fn decode(mut data: Bytes) -> CodecResult<(L3Header, Self)> {
        let header = L3Header::decode(&mut data)?;
        let msg = Self::decode_with_header(&header, &mut data)?;
        Ok((header, msg))
    }
}

#[inline]
fn ensure(buf: &Bytes, n: usize) -> CodecResult<()> {
    if buf.remaining() < n {
        return Err(CodecError::BufferTooShort {
            expected: n,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut Bytes) -> CodecResult<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut Bytes) -> CodecResult<u16> {
    ensure(buf, 2)?;
    Ok(buf.get_u16())
}

pub(crate) fn get_i16(buf: &mut Bytes) -> CodecResult<i16> {
    ensure(buf, 2)?;
    Ok(buf.get_i16())
}

pub(crate) fn get_u32(buf: &mut Bytes) -> CodecResult<u32> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

pub(crate) fn get_bool(buf: &mut Bytes) -> CodecResult<bool> {
    Ok(get_u8(buf)? != 0)
}

/// Reads a one byte value and converts it through `TryFrom<u8>`.
pub(crate) fn get_enum<T: TryFrom<u8>>(buf: &mut Bytes, field: &'static str) -> CodecResult<T> {
    let v = get_u8(buf)?;
    T::try_from(v).map_err(|_| CodecError::InvalidValue {
        field,
        value: u32::from(v),
    })
}

pub(crate) fn put_opt_u32(buf: &mut BytesMut, v: Option<u32>) {
    match v {
        Some(v) => {
            buf.put_u8(1);
            buf.put_u32(v);
        }
        None => buf.put_u8(0),
    }
}

pub(crate) fn get_opt_u32(buf: &mut Bytes) -> CodecResult<Option<u32>> {
    if get_bool(buf)? {
        Ok(Some(get_u32(buf)?))
    } else {
        Ok(None)
    }
}

pub(crate) fn put_opt_u8(buf: &mut BytesMut, v: Option<u8>) {
    buf.put_u8(if v.is_some() { 1 } else { 0 });
    buf.put_u8(v.unwrap_or(0));
}

pub(crate) fn get_opt_u8(buf: &mut Bytes) -> CodecResult<Option<u8>> {
    let present = get_bool(buf)?;
    let v = get_u8(buf)?;
    Ok(present.then_some(v))
}

pub(crate) fn put_domain(buf: &mut BytesMut, d: CnDomain) {
    buf.put_u8(d.into());
}

pub(crate) fn get_domain(buf: &mut Bytes) -> CodecResult<CnDomain> {
    get_enum(buf, "cn_domain")
}

pub(crate) fn put_reg_area(buf: &mut BytesMut, area: &RegAreaId) {
    buf.put_u32(area.plmn.to_u32());
    buf.put_u16(area.lac);
    buf.put_u8(area.rac);
}

pub(crate) fn get_reg_area(buf: &mut Bytes) -> CodecResult<RegAreaId> {
    let plmn = PlmnId::from_u32(get_u32(buf)?);
    let lac = get_u16(buf)?;
    let rac = get_u8(buf)?;
    Ok(RegAreaId::new(plmn, lac, rac))
}

pub(crate) fn put_qos(buf: &mut BytesMut, qos: &QosDescriptor) {
    buf.put_u8(qos.traffic_class.into());
    buf.put_u32(qos.max_bitrate_ul_kbps);
    buf.put_u32(qos.max_bitrate_dl_kbps);
}

pub(crate) fn get_qos(buf: &mut Bytes) -> CodecResult<QosDescriptor> {
    let traffic_class: TrafficClass = get_enum(buf, "traffic_class")?;
    Ok(QosDescriptor {
        traffic_class,
        max_bitrate_ul_kbps: get_u32(buf)?,
        max_bitrate_dl_kbps: get_u32(buf)?,
    })
}

pub(crate) fn put_classifier(buf: &mut BytesMut, c: &FlowClassifier) {
    buf.put_u32(c.src_addr);
    buf.put_u32(c.dst_addr);
    buf.put_u16(c.src_port);
    buf.put_u16(c.dst_port);
    buf.put_u8(c.protocol);
}

pub(crate) fn get_classifier(buf: &mut Bytes) -> CodecResult<FlowClassifier> {
    Ok(FlowClassifier {
        src_addr: get_u32(buf)?,
        dst_addr: get_u32(buf)?,
        src_port: get_u16(buf)?,
        dst_port: get_u16(buf)?,
        protocol: get_u8(buf)?,
    })
}
