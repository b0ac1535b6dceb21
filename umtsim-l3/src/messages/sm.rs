//! Session management messages

use bytes::{BufMut, Bytes, BytesMut};
use umtsim_common::{FlowClassifier, QosDescriptor};

use crate::codec::{
    get_classifier, get_enum, get_qos, get_u8, put_classifier, put_qos, CodecError, CodecResult,
    L3Message,
};
use crate::enums::{ProtocolDiscriminator, SmCause, SmMessageType};

/// SM message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmMessage {
    ActivatePdpContextRequest {
        nsapi: u8,
        qos: QosDescriptor,
        classifier: FlowClassifier,
    },
    ActivatePdpContextAccept { rab_id: u8, qos: QosDescriptor },
    ActivatePdpContextReject { cause: SmCause },
    /// Network asks the UE to activate a context for `classifier`
    RequestPdpContextActivation { classifier: FlowClassifier, qos: QosDescriptor },
    RequestPdpContextActivationReject { cause: SmCause },
    DeactivatePdpContextRequest { cause: SmCause },
    DeactivatePdpContextAccept,
    SmStatus { cause: SmCause },
}

impl L3Message for SmMessage {
    const PD: ProtocolDiscriminator = ProtocolDiscriminator::Sm;

    fn message_type(&self) -> u8 {
        let ty = match self {
            SmMessage::ActivatePdpContextRequest { .. } => SmMessageType::ActivatePdpContextRequest,
            SmMessage::ActivatePdpContextAccept { .. } => SmMessageType::ActivatePdpContextAccept,
            SmMessage::ActivatePdpContextReject { .. } => SmMessageType::ActivatePdpContextReject,
            SmMessage::RequestPdpContextActivation { .. } => {
                SmMessageType::RequestPdpContextActivation
            }
            SmMessage::RequestPdpContextActivationReject { .. } => {
                SmMessageType::RequestPdpContextActivationReject
            }
            SmMessage::DeactivatePdpContextRequest { .. } => {
                SmMessageType::DeactivatePdpContextRequest
            }
            SmMessage::DeactivatePdpContextAccept => SmMessageType::DeactivatePdpContextAccept,
            SmMessage::SmStatus { .. } => SmMessageType::SmStatus,
        };
        ty.into()
    }

    fn name(&self) -> &'static str {
        match self {
            SmMessage::ActivatePdpContextRequest { .. } => "ACTIVATE PDP CONTEXT REQUEST",
            SmMessage::ActivatePdpContextAccept { .. } => "ACTIVATE PDP CONTEXT ACCEPT",
            SmMessage::ActivatePdpContextReject { .. } => "ACTIVATE PDP CONTEXT REJECT",
            SmMessage::RequestPdpContextActivation { .. } => "REQUEST PDP CONTEXT ACTIVATION",
            SmMessage::RequestPdpContextActivationReject { .. } => {
                "REQUEST PDP CONTEXT ACTIVATION REJECT"
            }
            SmMessage::DeactivatePdpContextRequest { .. } => "DEACTIVATE PDP CONTEXT REQUEST",
            SmMessage::DeactivatePdpContextAccept => "DEACTIVATE PDP CONTEXT ACCEPT",
            SmMessage::SmStatus { .. } => "SM STATUS",
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            SmMessage::ActivatePdpContextRequest { nsapi, qos, classifier } => {
                buf.put_u8(*nsapi);
                put_qos(buf, qos);
                put_classifier(buf, classifier);
            }
            SmMessage::ActivatePdpContextAccept { rab_id, qos } => {
                buf.put_u8(*rab_id);
                put_qos(buf, qos);
            }
            SmMessage::RequestPdpContextActivation { classifier, qos } => {
                put_classifier(buf, classifier);
                put_qos(buf, qos);
            }
            SmMessage::ActivatePdpContextReject { cause }
            | SmMessage::RequestPdpContextActivationReject { cause }
            | SmMessage::DeactivatePdpContextRequest { cause }
            | SmMessage::SmStatus { cause } => buf.put_u8((*cause).into()),
            SmMessage::DeactivatePdpContextAccept => {}
        }
    }

    fn decode_body(msg_type: u8, buf: &mut Bytes) -> CodecResult<Self> {
        use SmMessageType as T;
        let ty = T::try_from(msg_type).map_err(|_| CodecError::UnknownMessageType {
            pd: Self::PD,
            msg_type,
        })?;
        let msg = match ty {
            T::ActivatePdpContextRequest => SmMessage::ActivatePdpContextRequest {
                nsapi: get_u8(buf)?,
                qos: get_qos(buf)?,
                classifier: get_classifier(buf)?,
            },
            T::ActivatePdpContextAccept => SmMessage::ActivatePdpContextAccept {
                rab_id: get_u8(buf)?,
                qos: get_qos(buf)?,
            },
            T::ActivatePdpContextReject => {
                SmMessage::ActivatePdpContextReject { cause: get_enum(buf, "sm_cause")? }
            }
            T::RequestPdpContextActivation => SmMessage::RequestPdpContextActivation {
                classifier: get_classifier(buf)?,
                qos: get_qos(buf)?,
            },
            T::RequestPdpContextActivationReject => {
                SmMessage::RequestPdpContextActivationReject { cause: get_enum(buf, "sm_cause")? }
            }
            T::DeactivatePdpContextRequest => {
                SmMessage::DeactivatePdpContextRequest { cause: get_enum(buf, "sm_cause")? }
            }
            T::DeactivatePdpContextAccept => SmMessage::DeactivatePdpContextAccept,
            T::SmStatus => SmMessage::SmStatus { cause: get_enum(buf, "sm_cause")? },
            T::ModifyPdpContextRequestNetwork | T::ModifyPdpContextAcceptMobile => {
                return Err(CodecError::UnexpectedMessage {
                    pd: Self::PD,
                    msg_type,
                })
            }
        };
        Ok(msg)
    }
}
