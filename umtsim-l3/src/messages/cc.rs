//! Call control messages

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{get_enum, get_opt_u8, get_u32, put_opt_u8, CodecError, CodecResult, L3Message};
use crate::enums::{CcCause, CcMessageType, ProtocolDiscriminator};

/// CC message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CcMessage {
    Setup {
        /// Called (uplink) or calling (downlink) party
        peer: u32,
        /// Application instance at the originating end
        app_id: u32,
        /// Requested call duration, 0 when open ended
        duration_ms: u32,
    },
    CallProceeding,
    Alerting,
    CallConfirmed,
    Progress,
    /// Carries the radio access bearer assigned to the call
    Connect { rab_id: Option<u8> },
    ConnectAcknowledge { rab_id: Option<u8> },
    Disconnect { cause: CcCause },
    Release { cause: CcCause },
    ReleaseComplete { cause: CcCause },
    Status { cause: CcCause },
    Notify,
}

impl L3Message for CcMessage {
    const PD: ProtocolDiscriminator = ProtocolDiscriminator::Cc;

    fn message_type(&self) -> u8 {
        let ty = match self {
            CcMessage::Setup { .. } => CcMessageType::Setup,
            CcMessage::CallProceeding => CcMessageType::CallProceeding,
            CcMessage::Alerting => CcMessageType::Alerting,
            CcMessage::CallConfirmed => CcMessageType::CallConfirmed,
            CcMessage::Progress => CcMessageType::Progress,
            CcMessage::Connect { .. } => CcMessageType::Connect,
            CcMessage::ConnectAcknowledge { .. } => CcMessageType::ConnectAcknowledge,
            CcMessage::Disconnect { .. } => CcMessageType::Disconnect,
            CcMessage::Release { .. } => CcMessageType::Release,
            CcMessage::ReleaseComplete { .. } => CcMessageType::ReleaseComplete,
            CcMessage::Status { .. } => CcMessageType::Status,
            CcMessage::Notify => CcMessageType::Notify,
        };
        ty.into()
    }

    fn name(&self) -> &'static str {
        match self {
            CcMessage::Setup { .. } => "SETUP",
            CcMessage::CallProceeding => "CALL PROCEEDING",
            CcMessage::Alerting => "ALERTING",
            CcMessage::CallConfirmed => "CALL CONFIRMED",
            CcMessage::Progress => "PROGRESS",
            CcMessage::Connect { .. } => "CONNECT",
            CcMessage::ConnectAcknowledge { .. } => "CONNECT ACKNOWLEDGE",
            CcMessage::Disconnect { .. } => "DISCONNECT",
            CcMessage::Release { .. } => "RELEASE",
            CcMessage::ReleaseComplete { .. } => "RELEASE COMPLETE",
            CcMessage::Status { .. } => "STATUS",
            CcMessage::Notify => "NOTIFY",
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            CcMessage::Setup { peer, app_id, duration_ms } => {
                buf.put_u32(*peer);
                buf.put_u32(*app_id);
                buf.put_u32(*duration_ms);
            }
            CcMessage::Connect { rab_id } | CcMessage::ConnectAcknowledge { rab_id } => {
                put_opt_u8(buf, *rab_id)
            }
            CcMessage::Disconnect { cause }
            | CcMessage::Release { cause }
            | CcMessage::ReleaseComplete { cause }
            | CcMessage::Status { cause } => buf.put_u8((*cause).into()),
            CcMessage::CallProceeding
            | CcMessage::Alerting
            | CcMessage::CallConfirmed
            | CcMessage::Progress
            | CcMessage::Notify => {}
        }
    }

    fn decode_body(msg_type: u8, buf: &mut Bytes) -> CodecResult<Self> {
        let ty = CcMessageType::try_from(msg_type).map_err(|_| CodecError::UnknownMessageType {
            pd: Self::PD,
            msg_type,
        })?;
        let msg = match ty {
            CcMessageType::Setup => CcMessage::Setup {
                peer: get_u32(buf)?,
                app_id: get_u32(buf)?,
                duration_ms: get_u32(buf)?,
            },
            CcMessageType::CallProceeding => CcMessage::CallProceeding,
            CcMessageType::Alerting => CcMessage::Alerting,
            CcMessageType::CallConfirmed => CcMessage::CallConfirmed,
            CcMessageType::Progress => CcMessage::Progress,
            CcMessageType::Connect => CcMessage::Connect { rab_id: get_opt_u8(buf)? },
            CcMessageType::ConnectAcknowledge => {
                CcMessage::ConnectAcknowledge { rab_id: get_opt_u8(buf)? }
            }
            CcMessageType::Disconnect => CcMessage::Disconnect { cause: get_enum(buf, "cc_cause")? },
            CcMessageType::Release => CcMessage::Release { cause: get_enum(buf, "cc_cause")? },
            CcMessageType::ReleaseComplete => {
                CcMessage::ReleaseComplete { cause: get_enum(buf, "cc_cause")? }
            }
            CcMessageType::Status => CcMessage::Status { cause: get_enum(buf, "cc_cause")? },
            CcMessageType::Notify => CcMessage::Notify,
            CcMessageType::EmergencySetup => {
                return Err(CodecError::UnexpectedMessage {
                    pd: Self::PD,
                    msg_type,
                })
            }
        };
        Ok(msg)
    }
}
