//! Layer-3 messages
//!
//! ## Message Categories
//!
//! - RRC messages - [`rrc`]
//! - CS mobility management - [`mm`]
//! - PS mobility management - [`gmm`]
//! - Call control - [`cc`]
//! - Session management - [`sm`]
//!
//! NAS messages (MM, GMM, CC, SM) are wrapped in [`NasPdu`] for transport
//! inside RRC direct transfers.

pub mod cc;
pub mod gmm;
pub mod mm;
pub mod rrc;
pub mod sm;

pub use cc::CcMessage;
pub use gmm::GmmMessage;
pub use mm::MmMessage;
pub use rrc::{CellMeasurement, RrcMessage, SystemInformationBlock};
pub use sm::SmMessage;

use bytes::Bytes;
use umtsim_common::CnDomain;

use crate::codec::{CodecError, CodecResult, L3Message};
use crate::enums::ProtocolDiscriminator;
use crate::header::{L3Header, TransactionId};

/// A NAS message of any supported protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NasPdu {
    Mm(MmMessage),
    Gmm(GmmMessage),
    Cc { ti: TransactionId, msg: CcMessage },
    Sm { ti: TransactionId, msg: SmMessage },
}

impl NasPdu {
    pub fn pd(&self) -> ProtocolDiscriminator {
        match self {
            NasPdu::Mm(_) => ProtocolDiscriminator::Mm,
            NasPdu::Gmm(_) => ProtocolDiscriminator::Gmm,
            NasPdu::Cc { .. } => ProtocolDiscriminator::Cc,
            NasPdu::Sm { .. } => ProtocolDiscriminator::Sm,
        }
    }

    /// CN domain the message belongs to.
    pub fn domain(&self) -> CnDomain {
        match self {
            NasPdu::Mm(_) | NasPdu::Cc { .. } => CnDomain::Cs,
            NasPdu::Gmm(_) | NasPdu::Sm { .. } => CnDomain::Ps,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NasPdu::Mm(m) => m.name(),
            NasPdu::Gmm(m) => m.name(),
            NasPdu::Cc { msg, .. } => msg.name(),
            NasPdu::Sm { msg, .. } => msg.name(),
        }
    }

    pub fn message_type(&self) -> u8 {
        match self {
            NasPdu::Mm(m) => m.message_type(),
            NasPdu::Gmm(m) => m.message_type(),
            NasPdu::Cc { msg, .. } => msg.message_type(),
            NasPdu::Sm { msg, .. } => msg.message_type(),
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            NasPdu::Mm(m) => m.encode(0),
            NasPdu::Gmm(m) => m.encode(0),
            NasPdu::Cc { ti, msg } => msg.encode(ti.to_nibble()),
            NasPdu::Sm { ti, msg } => msg.encode(ti.to_nibble()),
        }
    }

    pub fn decode(mut data: Bytes) -> CodecResult<Self> {
        let header = L3Header::decode(&mut data)?;
        let pdu = match header.pd {
            ProtocolDiscriminator::Mm => NasPdu::Mm(MmMessage::decode_with_header(&header, &mut data)?),
            ProtocolDiscriminator::Gmm => {
                NasPdu::Gmm(GmmMessage::decode_with_header(&header, &mut data)?)
            }
            ProtocolDiscriminator::Cc => NasPdu::Cc {
                ti: header.transaction_id(),
                msg: CcMessage::decode_with_header(&header, &mut data)?,
            },
            ProtocolDiscriminator::Sm => NasPdu::Sm {
                ti: header.transaction_id(),
                msg: SmMessage::decode_with_header(&header, &mut data)?,
            },
            other => {
                return Err(CodecError::UnknownMessageType {
                    pd: other,
                    msg_type: header.msg_type,
                })
            }
        };
        Ok(pdu)
    }
}
