//! RRC messages (TS 25.331, reduced information elements)

use bytes::{BufMut, Bytes, BytesMut};
use umtsim_common::{CellId, CnDomain, RegAreaId};

use crate::codec::{
    get_domain, get_enum, get_i16, get_reg_area, get_u32, get_u8, put_domain, put_reg_area,
    CodecError, CodecResult, L3Message,
};
use crate::enums::{ActiveSetAction, EstablishmentCause, PagingCause, ProtocolDiscriminator, RrMessageType, SibType};
use crate::header::DomainTag;

/// Averaged CPICH measurement of one cell in a MEASUREMENT REPORT
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMeasurement {
    pub cell_id: CellId,
    /// CPICH RSCP in dBm, carried with 0.1 dB resolution
    pub rscp_dbm: f64,
}

/// System information block contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemInformationBlock {
    /// Master information block; a changed value tag invalidates the
    /// cell's stored SIBs
    Master { value_tag: u8 },
    /// CN domain information
    Sib1 {
        /// Periodic location update timer in deci-hours, 0 disables it
        t3212_deci_hours: u8,
        /// IMSI attach/detach allowed
        attach_allowed: bool,
    },
    /// Cell identity and selection parameters
    Sib3 { reg_area: RegAreaId, q_rxlev_min: i8 },
    /// Common physical channel configuration
    Sib5,
    /// Uplink interference
    Sib7,
    /// Any other block, recorded but not interpreted
    Other(SibType),
}

impl SystemInformationBlock {
    pub fn sib_type(&self) -> SibType {
        match self {
            SystemInformationBlock::Master { .. } => SibType::Master,
            SystemInformationBlock::Sib1 { .. } => SibType::Type1,
            SystemInformationBlock::Sib3 { .. } => SibType::Type3,
            SystemInformationBlock::Sib5 => SibType::Type5,
            SystemInformationBlock::Sib7 => SibType::Type7,
            SystemInformationBlock::Other(t) => *t,
        }
    }
}

/// RRC message
#[derive(Debug, Clone, PartialEq)]
pub enum RrcMessage {
    RrcConnectionRequest { ue_id: u32, cause: EstablishmentCause, domain: CnDomain },
    RrcConnectionSetup { ue_id: u32 },
    RrcConnectionSetupComplete,
    RrcConnectionReject { ue_id: u32, wait_time_s: u8 },
    RrcConnectionRelease,
    RrcConnectionReleaseComplete,
    RadioBearerSetup { rab_id: u8, domain: CnDomain, rb_id: u8 },
    RadioBearerSetupComplete { rab_id: u8 },
    RadioBearerRelease { rab_id: u8 },
    RadioBearerReleaseComplete { rab_id: u8 },
    ActiveSetUpdate { action: ActiveSetAction, cell_id: CellId },
    ActiveSetUpdateComplete { action: ActiveSetAction, cell_id: CellId },
    ActiveSetUpdateFailure { cell_id: CellId },
    MeasurementReport { measurements: Vec<CellMeasurement> },
    PagingType1 { ue_id: u32, domain: CnDomain, cause: PagingCause },
    PagingType2 { domain: CnDomain, cause: PagingCause },
    SignallingConnectionRelease { domain: CnDomain },
    SignallingConnectionReleaseIndication { domain: CnDomain },
    SystemInformation { cell_id: CellId, block: SystemInformationBlock },
    InitialDirectTransfer { domain: CnDomain, nas: Bytes },
    UplinkDirectTransfer { domain: CnDomain, nas: Bytes },
    DownlinkDirectTransfer { domain: CnDomain, nas: Bytes },
}

impl RrcMessage {
    pub fn rr_type(&self) -> RrMessageType {
        use RrMessageType as T;
        match self {
            RrcMessage::RrcConnectionRequest { .. } => T::RrcConnectionRequest,
            RrcMessage::RrcConnectionSetup { .. } => T::RrcConnectionSetup,
            RrcMessage::RrcConnectionSetupComplete => T::RrcConnectionSetupComplete,
            RrcMessage::RrcConnectionReject { .. } => T::RrcConnectionReject,
            RrcMessage::RrcConnectionRelease => T::RrcConnectionRelease,
            RrcMessage::RrcConnectionReleaseComplete => T::RrcConnectionReleaseComplete,
            RrcMessage::RadioBearerSetup { .. } => T::RadioBearerSetup,
            RrcMessage::RadioBearerSetupComplete { .. } => T::RadioBearerSetupComplete,
            RrcMessage::RadioBearerRelease { .. } => T::RadioBearerRelease,
            RrcMessage::RadioBearerReleaseComplete { .. } => T::RadioBearerReleaseComplete,
            RrcMessage::ActiveSetUpdate { .. } => T::ActiveSetUpdate,
            RrcMessage::ActiveSetUpdateComplete { .. } => T::ActiveSetUpdateComplete,
            RrcMessage::ActiveSetUpdateFailure { .. } => T::ActiveSetUpdateFailure,
            RrcMessage::MeasurementReport { .. } => T::MeasurementReport,
            RrcMessage::PagingType1 { .. } => T::PagingType1,
            RrcMessage::PagingType2 { .. } => T::PagingType2,
            RrcMessage::SignallingConnectionRelease { .. } => T::SignallingConnectionRelease,
            RrcMessage::SignallingConnectionReleaseIndication { .. } => {
                T::SignallingConnectionReleaseIndication
            }
            RrcMessage::SystemInformation { .. } => T::SystemInformationBch,
            RrcMessage::InitialDirectTransfer { .. } => T::InitialDirectTransfer,
            RrcMessage::UplinkDirectTransfer { .. } => T::UplinkDirectTransfer,
            RrcMessage::DownlinkDirectTransfer { .. } => T::DownlinkDirectTransfer,
        }
    }
}

impl L3Message for RrcMessage {
    const PD: ProtocolDiscriminator = ProtocolDiscriminator::Rr;

    fn message_type(&self) -> u8 {
        self.rr_type().into()
    }

    fn name(&self) -> &'static str {
        match self {
            RrcMessage::RrcConnectionRequest { .. } => "RRC CONNECTION REQUEST",
            RrcMessage::RrcConnectionSetup { .. } => "RRC CONNECTION SETUP",
            RrcMessage::RrcConnectionSetupComplete => "RRC CONNECTION SETUP COMPLETE",
            RrcMessage::RrcConnectionReject { .. } => "RRC CONNECTION REJECT",
            RrcMessage::RrcConnectionRelease => "RRC CONNECTION RELEASE",
            RrcMessage::RrcConnectionReleaseComplete => "RRC CONNECTION RELEASE COMPLETE",
            RrcMessage::RadioBearerSetup { .. } => "RADIO BEARER SETUP",
            RrcMessage::RadioBearerSetupComplete { .. } => "RADIO BEARER SETUP COMPLETE",
            RrcMessage::RadioBearerRelease { .. } => "RADIO BEARER RELEASE",
            RrcMessage::RadioBearerReleaseComplete { .. } => "RADIO BEARER RELEASE COMPLETE",
            RrcMessage::ActiveSetUpdate { .. } => "ACTIVE SET UPDATE",
            RrcMessage::ActiveSetUpdateComplete { .. } => "ACTIVE SET UPDATE COMPLETE",
            RrcMessage::ActiveSetUpdateFailure { .. } => "ACTIVE SET UPDATE FAILURE",
            RrcMessage::MeasurementReport { .. } => "MEASUREMENT REPORT",
            RrcMessage::PagingType1 { .. } => "PAGING TYPE 1",
            RrcMessage::PagingType2 { .. } => "PAGING TYPE 2",
            RrcMessage::SignallingConnectionRelease { .. } => "SIGNALLING CONNECTION RELEASE",
            RrcMessage::SignallingConnectionReleaseIndication { .. } => {
                "SIGNALLING CONNECTION RELEASE INDICATION"
            }
            RrcMessage::SystemInformation { .. } => "SYSTEM INFORMATION",
            RrcMessage::InitialDirectTransfer { .. } => "INITIAL DIRECT TRANSFER",
            RrcMessage::UplinkDirectTransfer { .. } => "UPLINK DIRECT TRANSFER",
            RrcMessage::DownlinkDirectTransfer { .. } => "DOWNLINK DIRECT TRANSFER",
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            RrcMessage::RrcConnectionRequest { ue_id, cause, domain } => {
                buf.put_u32(*ue_id);
                buf.put_u8((*cause).into());
                put_domain(buf, *domain);
            }
            RrcMessage::RrcConnectionSetup { ue_id } => buf.put_u32(*ue_id),
            RrcMessage::RrcConnectionReject { ue_id, wait_time_s } => {
                buf.put_u32(*ue_id);
                buf.put_u8(*wait_time_s);
            }
            RrcMessage::RrcConnectionSetupComplete
            | RrcMessage::RrcConnectionRelease
            | RrcMessage::RrcConnectionReleaseComplete => {}
            RrcMessage::RadioBearerSetup { rab_id, domain, rb_id } => {
                buf.put_u8(*rab_id);
                put_domain(buf, *domain);
                buf.put_u8(*rb_id);
            }
            RrcMessage::RadioBearerSetupComplete { rab_id }
            | RrcMessage::RadioBearerRelease { rab_id }
            | RrcMessage::RadioBearerReleaseComplete { rab_id } => buf.put_u8(*rab_id),
            RrcMessage::ActiveSetUpdate { action, cell_id }
            | RrcMessage::ActiveSetUpdateComplete { action, cell_id } => {
                buf.put_u8((*action).into());
                buf.put_u32(*cell_id);
            }
            RrcMessage::ActiveSetUpdateFailure { cell_id } => buf.put_u32(*cell_id),
            RrcMessage::MeasurementReport { measurements } => {
                buf.put_u8(measurements.len().min(u8::MAX as usize) as u8);
                for m in measurements.iter().take(u8::MAX as usize) {
                    buf.put_u32(m.cell_id);
                    buf.put_i16((m.rscp_dbm * 10.0).round() as i16);
                }
            }
            RrcMessage::PagingType1 { ue_id, domain, cause } => {
                buf.put_u32(*ue_id);
                put_domain(buf, *domain);
                buf.put_u8((*cause).into());
            }
            RrcMessage::PagingType2 { domain, cause } => {
                put_domain(buf, *domain);
                buf.put_u8((*cause).into());
            }
            RrcMessage::SignallingConnectionRelease { domain }
            | RrcMessage::SignallingConnectionReleaseIndication { domain } => put_domain(buf, *domain),
            RrcMessage::SystemInformation { cell_id, block } => {
                buf.put_u32(*cell_id);
                buf.put_u8(block.sib_type().into());
                match block {
                    SystemInformationBlock::Master { value_tag } => buf.put_u8(*value_tag),
                    SystemInformationBlock::Sib1 { t3212_deci_hours, attach_allowed } => {
                        buf.put_u8(*t3212_deci_hours);
                        buf.put_u8(u8::from(*attach_allowed));
                    }
                    SystemInformationBlock::Sib3 { reg_area, q_rxlev_min } => {
                        put_reg_area(buf, reg_area);
                        buf.put_i8(*q_rxlev_min);
                    }
                    SystemInformationBlock::Sib5
                    | SystemInformationBlock::Sib7
                    | SystemInformationBlock::Other(_) => {}
                }
            }
            RrcMessage::InitialDirectTransfer { domain, nas }
            | RrcMessage::UplinkDirectTransfer { domain, nas }
            | RrcMessage::DownlinkDirectTransfer { domain, nas } => {
                DomainTag(*domain).encode(buf);
                buf.put_slice(nas);
            }
        }
    }

    fn decode_body(msg_type: u8, buf: &mut Bytes) -> CodecResult<Self> {
        let ty = RrMessageType::try_from(msg_type).map_err(|_| CodecError::UnknownMessageType {
            pd: Self::PD,
            msg_type,
        })?;
        use RrMessageType as T;
        let msg = match ty {
            T::RrcConnectionRequest => RrcMessage::RrcConnectionRequest {
                ue_id: get_u32(buf)?,
                cause: get_enum(buf, "establishment_cause")?,
                domain: get_domain(buf)?,
            },
            T::RrcConnectionSetup => RrcMessage::RrcConnectionSetup { ue_id: get_u32(buf)? },
            T::RrcConnectionSetupComplete => RrcMessage::RrcConnectionSetupComplete,
            T::RrcConnectionReject => RrcMessage::RrcConnectionReject {
                ue_id: get_u32(buf)?,
                wait_time_s: get_u8(buf)?,
            },
            T::RrcConnectionRelease => RrcMessage::RrcConnectionRelease,
            T::RrcConnectionReleaseComplete => RrcMessage::RrcConnectionReleaseComplete,
            T::RadioBearerSetup => RrcMessage::RadioBearerSetup {
                rab_id: get_u8(buf)?,
                domain: get_domain(buf)?,
                rb_id: get_u8(buf)?,
            },
            T::RadioBearerSetupComplete => RrcMessage::RadioBearerSetupComplete { rab_id: get_u8(buf)? },
            T::RadioBearerRelease => RrcMessage::RadioBearerRelease { rab_id: get_u8(buf)? },
            T::RadioBearerReleaseComplete => {
                RrcMessage::RadioBearerReleaseComplete { rab_id: get_u8(buf)? }
            }
            T::ActiveSetUpdate => RrcMessage::ActiveSetUpdate {
                action: get_enum(buf, "active_set_action")?,
                cell_id: get_u32(buf)?,
            },
            T::ActiveSetUpdateComplete => RrcMessage::ActiveSetUpdateComplete {
                action: get_enum(buf, "active_set_action")?,
                cell_id: get_u32(buf)?,
            },
            T::ActiveSetUpdateFailure => RrcMessage::ActiveSetUpdateFailure { cell_id: get_u32(buf)? },
            T::MeasurementReport => {
                let n = get_u8(buf)?;
                let mut measurements = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let cell_id = get_u32(buf)?;
                    let rscp_dbm = f64::from(get_i16(buf)?) / 10.0;
                    measurements.push(CellMeasurement { cell_id, rscp_dbm });
                }
                RrcMessage::MeasurementReport { measurements }
            }
            T::PagingType1 => RrcMessage::PagingType1 {
                ue_id: get_u32(buf)?,
                domain: get_domain(buf)?,
                cause: get_enum(buf, "paging_cause")?,
            },
            T::PagingType2 => RrcMessage::PagingType2 {
                domain: get_domain(buf)?,
                cause: get_enum(buf, "paging_cause")?,
            },
            T::SignallingConnectionRelease => {
                RrcMessage::SignallingConnectionRelease { domain: get_domain(buf)? }
            }
            T::SignallingConnectionReleaseIndication => {
                RrcMessage::SignallingConnectionReleaseIndication { domain: get_domain(buf)? }
            }
            T::SystemInformationBch | T::SystemInformationFach => {
                let cell_id = get_u32(buf)?;
                let sib: SibType = get_enum(buf, "sib_type")?;
                let block = match sib {
                    SibType::Master => SystemInformationBlock::Master { value_tag: get_u8(buf)? },
                    SibType::Type1 => SystemInformationBlock::Sib1 {
                        t3212_deci_hours: get_u8(buf)?,
                        attach_allowed: get_u8(buf)? != 0,
                    },
                    SibType::Type3 => SystemInformationBlock::Sib3 {
                        reg_area: get_reg_area(buf)?,
                        q_rxlev_min: get_u8(buf)? as i8,
                    },
                    SibType::Type5 => SystemInformationBlock::Sib5,
                    SibType::Type7 => SystemInformationBlock::Sib7,
                    other => SystemInformationBlock::Other(other),
                };
                RrcMessage::SystemInformation { cell_id, block }
            }
            T::InitialDirectTransfer | T::UplinkDirectTransfer | T::DownlinkDirectTransfer => {
                let DomainTag(domain) = DomainTag::decode(buf)?;
                let nas = buf.split_off(0);
                match ty {
                    T::InitialDirectTransfer => RrcMessage::InitialDirectTransfer { domain, nas },
                    T::UplinkDirectTransfer => RrcMessage::UplinkDirectTransfer { domain, nas },
                    _ => RrcMessage::DownlinkDirectTransfer { domain, nas },
                }
            }
            _ => {
                return Err(CodecError::UnexpectedMessage {
                    pd: Self::PD,
                    msg_type,
                })
            }
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umtsim_common::PlmnId;

    #[test]
    fn test_connection_request_bytes() {
        let msg = RrcMessage::RrcConnectionRequest {
            ue_id: 0x0102_0304,
            cause: EstablishmentCause::Registration,
            domain: CnDomain::Cs,
        };
        let bytes = msg.encode(0);
        assert_eq!(&bytes[..], &[0x60, 41, 0, 0, 1, 2, 3, 4, 11, 0]);
        let (header, decoded) = RrcMessage::decode(bytes).unwrap();
        assert_eq!(header.pd, ProtocolDiscriminator::Rr);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_direct_transfer_carries_domain_tag() {
        let nas = Bytes::from_static(&[0x50, 0x08, 0x00, 0x00, 0xAA]);
        let msg = RrcMessage::UplinkDirectTransfer { domain: CnDomain::Ps, nas: nas.clone() };
        let bytes = msg.encode(0);
        // RR header, domain tag, NAS header
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[5..], &nas[..]);
        let (_, decoded) = RrcMessage::decode(bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_system_information_sib3() {
        let area = RegAreaId::new(PlmnId::new(1, 1), 0x0010, 3);
        let msg = RrcMessage::SystemInformation {
            cell_id: 9,
            block: SystemInformationBlock::Sib3 { reg_area: area, q_rxlev_min: -58 },
        };
        let (_, decoded) = RrcMessage::decode(msg.encode(0)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_measurement_report_resolution() {
        let msg = RrcMessage::MeasurementReport {
            measurements: vec![CellMeasurement { cell_id: 1, rscp_dbm: -87.34 }],
        };
        let (_, decoded) = RrcMessage::decode(msg.encode(0)).unwrap();
        match decoded {
            RrcMessage::MeasurementReport { measurements } => {
                assert_eq!(measurements.len(), 1);
                assert!((measurements[0].rscp_dbm - -87.3).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let mut bytes = BytesMut::new();
        crate::header::L3Header::new(ProtocolDiscriminator::Rr, 0, RrMessageType::CounterCheck.into())
            .encode(&mut bytes);
        assert!(matches!(
            RrcMessage::decode(bytes.freeze()),
            Err(CodecError::UnexpectedMessage { .. })
        ));
    }

    #[test]
    fn test_truncated_body() {
        let bytes = RrcMessage::RrcConnectionSetup { ue_id: 5 }.encode(0);
        let truncated = bytes.slice(0..6);
        assert!(matches!(
            RrcMessage::decode(truncated),
            Err(CodecError::BufferTooShort { .. })
        ));
    }
}
