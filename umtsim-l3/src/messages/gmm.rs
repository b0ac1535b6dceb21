//! GPRS mobility management messages (PS domain)

use bytes::{BufMut, Bytes, BytesMut};
use umtsim_common::RegAreaId;

use crate::codec::{
    get_bool, get_enum, get_opt_u32, get_opt_u8, get_reg_area, put_opt_u32, put_opt_u8,
    put_reg_area, CodecError, CodecResult, L3Message,
};
use crate::enums::{AttachType, GmmMessageType, GmmServiceType, ProtocolDiscriminator, RaUpdateType, RejectCause};

/// GMM message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GmmMessage {
    AttachRequest {
        attach_type: AttachType,
        ptmsi: Option<u32>,
        last_area: RegAreaId,
    },
    AttachAccept {
        ptmsi: Option<u32>,
        area: RegAreaId,
        /// T3312 in minutes when present
        t3312_min: Option<u8>,
    },
    AttachComplete,
    AttachReject { cause: RejectCause },
    /// Uplink: UE-initiated detach. Downlink: network-initiated detach.
    DetachRequest {
        power_off: bool,
        reattach_required: bool,
        cause: Option<u8>,
    },
    DetachAccept,
    RoutingAreaUpdateRequest { update_type: RaUpdateType, last_area: RegAreaId },
    RoutingAreaUpdateAccept {
        ptmsi: Option<u32>,
        area: RegAreaId,
        t3312_min: Option<u8>,
    },
    RoutingAreaUpdateComplete,
    RoutingAreaUpdateReject { cause: RejectCause },
    ServiceRequest { service_type: GmmServiceType },
    ServiceAccept,
    ServiceReject { cause: RejectCause },
    GmmStatus { cause: RejectCause },
    GmmInformation,
}

impl L3Message for GmmMessage {
    const PD: ProtocolDiscriminator = ProtocolDiscriminator::Gmm;

    fn message_type(&self) -> u8 {
        use GmmMessageType as T;
        let ty = match self {
            GmmMessage::AttachRequest { .. } => T::AttachRequest,
            GmmMessage::AttachAccept { .. } => T::AttachAccept,
            GmmMessage::AttachComplete => T::AttachComplete,
            GmmMessage::AttachReject { .. } => T::AttachReject,
            GmmMessage::DetachRequest { .. } => T::DetachRequest,
            GmmMessage::DetachAccept => T::DetachAccept,
            GmmMessage::RoutingAreaUpdateRequest { .. } => T::RoutingAreaUpdateRequest,
            GmmMessage::RoutingAreaUpdateAccept { .. } => T::RoutingAreaUpdateAccept,
            GmmMessage::RoutingAreaUpdateComplete => T::RoutingAreaUpdateComplete,
            GmmMessage::RoutingAreaUpdateReject { .. } => T::RoutingAreaUpdateReject,
            GmmMessage::ServiceRequest { .. } => T::ServiceRequest,
            GmmMessage::ServiceAccept => T::ServiceAccept,
            GmmMessage::ServiceReject { .. } => T::ServiceReject,
            GmmMessage::GmmStatus { .. } => T::GmmStatus,
            GmmMessage::GmmInformation => T::GmmInformation,
        };
        ty.into()
    }

    fn name(&self) -> &'static str {
        match self {
            GmmMessage::AttachRequest { .. } => "ATTACH REQUEST",
            GmmMessage::AttachAccept { .. } => "ATTACH ACCEPT",
            GmmMessage::AttachComplete => "ATTACH COMPLETE",
            GmmMessage::AttachReject { .. } => "ATTACH REJECT",
            GmmMessage::DetachRequest { .. } => "DETACH REQUEST",
            GmmMessage::DetachAccept => "DETACH ACCEPT",
            GmmMessage::RoutingAreaUpdateRequest { .. } => "ROUTING AREA UPDATE REQUEST",
            GmmMessage::RoutingAreaUpdateAccept { .. } => "ROUTING AREA UPDATE ACCEPT",
            GmmMessage::RoutingAreaUpdateComplete => "ROUTING AREA UPDATE COMPLETE",
            GmmMessage::RoutingAreaUpdateReject { .. } => "ROUTING AREA UPDATE REJECT",
            GmmMessage::ServiceRequest { .. } => "SERVICE REQUEST",
            GmmMessage::ServiceAccept => "SERVICE ACCEPT",
            GmmMessage::ServiceReject { .. } => "SERVICE REJECT",
            GmmMessage::GmmStatus { .. } => "GMM STATUS",
            GmmMessage::GmmInformation => "GMM INFORMATION",
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            GmmMessage::AttachRequest { attach_type, ptmsi, last_area } => {
                buf.put_u8((*attach_type).into());
                put_opt_u32(buf, *ptmsi);
                put_reg_area(buf, last_area);
            }
            GmmMessage::AttachAccept { ptmsi, area, t3312_min }
            | GmmMessage::RoutingAreaUpdateAccept { ptmsi, area, t3312_min } => {
                put_opt_u32(buf, *ptmsi);
                put_reg_area(buf, area);
                put_opt_u8(buf, *t3312_min);
            }
            GmmMessage::AttachReject { cause }
            | GmmMessage::RoutingAreaUpdateReject { cause }
            | GmmMessage::ServiceReject { cause }
            | GmmMessage::GmmStatus { cause } => buf.put_u8((*cause).into()),
            GmmMessage::DetachRequest { power_off, reattach_required, cause } => {
                buf.put_u8(u8::from(*power_off));
                buf.put_u8(u8::from(*reattach_required));
                put_opt_u8(buf, *cause);
            }
            GmmMessage::RoutingAreaUpdateRequest { update_type, last_area } => {
                buf.put_u8((*update_type).into());
                put_reg_area(buf, last_area);
            }
            GmmMessage::ServiceRequest { service_type } => buf.put_u8((*service_type).into()),
            GmmMessage::AttachComplete
            | GmmMessage::DetachAccept
            | GmmMessage::RoutingAreaUpdateComplete
            | GmmMessage::ServiceAccept
            | GmmMessage::GmmInformation => {}
        }
    }

    fn decode_body(msg_type: u8, buf: &mut Bytes) -> CodecResult<Self> {
        use GmmMessageType as T;
        let ty = T::try_from(msg_type).map_err(|_| CodecError::UnknownMessageType {
            pd: Self::PD,
            msg_type,
        })?;
        let msg = match ty {
            T::AttachRequest => GmmMessage::AttachRequest {
                attach_type: get_enum(buf, "attach_type")?,
                ptmsi: get_opt_u32(buf)?,
                last_area: get_reg_area(buf)?,
            },
            T::AttachAccept => GmmMessage::AttachAccept {
                ptmsi: get_opt_u32(buf)?,
                area: get_reg_area(buf)?,
                t3312_min: get_opt_u8(buf)?,
            },
            T::AttachComplete => GmmMessage::AttachComplete,
            T::AttachReject => GmmMessage::AttachReject { cause: get_enum(buf, "gmm_cause")? },
            T::DetachRequest => GmmMessage::DetachRequest {
                power_off: get_bool(buf)?,
                reattach_required: get_bool(buf)?,
                cause: get_opt_u8(buf)?,
            },
            T::DetachAccept => GmmMessage::DetachAccept,
            T::RoutingAreaUpdateRequest => GmmMessage::RoutingAreaUpdateRequest {
                update_type: get_enum(buf, "ra_update_type")?,
                last_area: get_reg_area(buf)?,
            },
            T::RoutingAreaUpdateAccept => GmmMessage::RoutingAreaUpdateAccept {
                ptmsi: get_opt_u32(buf)?,
                area: get_reg_area(buf)?,
                t3312_min: get_opt_u8(buf)?,
            },
            T::RoutingAreaUpdateComplete => GmmMessage::RoutingAreaUpdateComplete,
            T::RoutingAreaUpdateReject => {
                GmmMessage::RoutingAreaUpdateReject { cause: get_enum(buf, "gmm_cause")? }
            }
            T::ServiceRequest => GmmMessage::ServiceRequest {
                service_type: get_enum(buf, "service_type")?,
            },
            T::ServiceAccept => GmmMessage::ServiceAccept,
            T::ServiceReject => GmmMessage::ServiceReject { cause: get_enum(buf, "gmm_cause")? },
            T::GmmStatus => GmmMessage::GmmStatus { cause: get_enum(buf, "gmm_cause")? },
            T::GmmInformation => GmmMessage::GmmInformation,
        };
        Ok(msg)
    }
}
