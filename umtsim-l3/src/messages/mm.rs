//! Mobility management messages (CS domain)

use bytes::{BufMut, Bytes, BytesMut};
use umtsim_common::RegAreaId;

use crate::codec::{
    get_enum, get_opt_u32, get_opt_u8, get_reg_area, put_opt_u32, put_opt_u8, put_reg_area,
    CodecError, CodecResult, L3Message,
};
use crate::enums::{CmServiceType, LocationUpdateType, MmMessageType, ProtocolDiscriminator, RejectCause};

/// MM message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmMessage {
    LocationUpdatingRequest {
        update_type: LocationUpdateType,
        /// Last registration area the UE was updated in
        last_area: RegAreaId,
        tmsi: Option<u32>,
    },
    LocationUpdatingAccept {
        area: RegAreaId,
        /// Newly allocated TMSI
        tmsi: Option<u32>,
        /// T3212 in deci-hours when the network overrides the broadcast value
        t3212_deci_hours: Option<u8>,
    },
    LocationUpdatingReject { cause: RejectCause },
    CmServiceRequest { service_type: CmServiceType, tmsi: Option<u32> },
    CmServiceAccept,
    CmServiceReject { cause: RejectCause },
    CmServiceAbort,
    Abort { cause: RejectCause },
    PagingResponse { tmsi: Option<u32> },
    ImsiDetachIndication { tmsi: Option<u32> },
    MmStatus { cause: RejectCause },
    MmInformation,
}

impl L3Message for MmMessage {
    const PD: ProtocolDiscriminator = ProtocolDiscriminator::Mm;

    fn message_type(&self) -> u8 {
        let ty = match self {
            MmMessage::LocationUpdatingRequest { .. } => MmMessageType::LocationUpdatingRequest,
            MmMessage::LocationUpdatingAccept { .. } => MmMessageType::LocationUpdatingAccept,
            MmMessage::LocationUpdatingReject { .. } => MmMessageType::LocationUpdatingReject,
            MmMessage::CmServiceRequest { .. } => MmMessageType::CmServiceRequest,
            MmMessage::CmServiceAccept => MmMessageType::CmServiceAccept,
            MmMessage::CmServiceReject { .. } => MmMessageType::CmServiceReject,
            MmMessage::CmServiceAbort => MmMessageType::CmServiceAbort,
            MmMessage::Abort { .. } => MmMessageType::Abort,
            MmMessage::PagingResponse { .. } => MmMessageType::PagingResponse,
            MmMessage::ImsiDetachIndication { .. } => MmMessageType::ImsiDetachIndication,
            MmMessage::MmStatus { .. } => MmMessageType::MmStatus,
            MmMessage::MmInformation => MmMessageType::MmInformation,
        };
        ty.into()
    }

    fn name(&self) -> &'static str {
        match self {
            MmMessage::LocationUpdatingRequest { .. } => "LOCATION UPDATING REQUEST",
            MmMessage::LocationUpdatingAccept { .. } => "LOCATION UPDATING ACCEPT",
            MmMessage::LocationUpdatingReject { .. } => "LOCATION UPDATING REJECT",
            MmMessage::CmServiceRequest { .. } => "CM SERVICE REQUEST",
            MmMessage::CmServiceAccept => "CM SERVICE ACCEPT",
            MmMessage::CmServiceReject { .. } => "CM SERVICE REJECT",
            MmMessage::CmServiceAbort => "CM SERVICE ABORT",
            MmMessage::Abort { .. } => "ABORT",
            MmMessage::PagingResponse { .. } => "PAGING RESPONSE",
            MmMessage::ImsiDetachIndication { .. } => "IMSI DETACH INDICATION",
            MmMessage::MmStatus { .. } => "MM STATUS",
            MmMessage::MmInformation => "MM INFORMATION",
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            MmMessage::LocationUpdatingRequest { update_type, last_area, tmsi } => {
                buf.put_u8((*update_type).into());
                put_reg_area(buf, last_area);
                put_opt_u32(buf, *tmsi);
            }
            MmMessage::LocationUpdatingAccept { area, tmsi, t3212_deci_hours } => {
                put_reg_area(buf, area);
                put_opt_u32(buf, *tmsi);
                put_opt_u8(buf, *t3212_deci_hours);
            }
            MmMessage::LocationUpdatingReject { cause }
            | MmMessage::CmServiceReject { cause }
            | MmMessage::Abort { cause }
            | MmMessage::MmStatus { cause } => buf.put_u8((*cause).into()),
            MmMessage::CmServiceRequest { service_type, tmsi } => {
                buf.put_u8((*service_type).into());
                put_opt_u32(buf, *tmsi);
            }
            MmMessage::PagingResponse { tmsi } | MmMessage::ImsiDetachIndication { tmsi } => {
                put_opt_u32(buf, *tmsi)
            }
            MmMessage::CmServiceAccept | MmMessage::CmServiceAbort | MmMessage::MmInformation => {}
        }
    }

    fn decode_body(msg_type: u8, buf: &mut Bytes) -> CodecResult<Self> {
        let ty = MmMessageType::try_from(msg_type).map_err(|_| CodecError::UnknownMessageType {
            pd: Self::PD,
            msg_type,
        })?;
        let msg = match ty {
            MmMessageType::LocationUpdatingRequest => MmMessage::LocationUpdatingRequest {
                update_type: get_enum(buf, "location_update_type")?,
                last_area: get_reg_area(buf)?,
                tmsi: get_opt_u32(buf)?,
            },
            MmMessageType::LocationUpdatingAccept => MmMessage::LocationUpdatingAccept {
                area: get_reg_area(buf)?,
                tmsi: get_opt_u32(buf)?,
                t3212_deci_hours: get_opt_u8(buf)?,
            },
            MmMessageType::LocationUpdatingReject => MmMessage::LocationUpdatingReject {
                cause: get_enum(buf, "reject_cause")?,
            },
            MmMessageType::CmServiceRequest => MmMessage::CmServiceRequest {
                service_type: get_enum(buf, "cm_service_type")?,
                tmsi: get_opt_u32(buf)?,
            },
            MmMessageType::CmServiceAccept => MmMessage::CmServiceAccept,
            MmMessageType::CmServiceReject => MmMessage::CmServiceReject {
                cause: get_enum(buf, "reject_cause")?,
            },
            MmMessageType::CmServiceAbort => MmMessage::CmServiceAbort,
            MmMessageType::Abort => MmMessage::Abort { cause: get_enum(buf, "reject_cause")? },
            MmMessageType::PagingResponse => MmMessage::PagingResponse { tmsi: get_opt_u32(buf)? },
            MmMessageType::ImsiDetachIndication => {
                MmMessage::ImsiDetachIndication { tmsi: get_opt_u32(buf)? }
            }
            MmMessageType::MmStatus => MmMessage::MmStatus { cause: get_enum(buf, "reject_cause")? },
            MmMessageType::MmInformation => MmMessage::MmInformation,
            MmMessageType::CmServicePrompt => {
                return Err(CodecError::UnexpectedMessage {
                    pd: Self::PD,
                    msg_type,
                })
            }
        };
        Ok(msg)
    }
}
