//! Helpers shared by the sublayer unit tests.

use umtsim_common::{CellId, PlmnId, RegAreaId, UeConfig};
use umtsim_l3::{L3Message, NasPdu, RrcMessage, SystemInformationBlock};

use crate::lower::{LowerLayerCommand, MetricKind, RB_BCCH, RB_CCCH, RB_DCCH_AM_NAS};
use crate::rrc::Rrc;
use crate::services::{Indication, UeServices};
use crate::timer::{TimerEvent, TimerHandle};

pub const CELL: CellId = 1;

pub struct Harness {
    pub rrc: Rrc,
    pub svc: UeServices,
}

pub fn area() -> RegAreaId {
    RegAreaId::new(PlmnId::new(1, 1), 0x10, 1)
}

pub fn other_area() -> RegAreaId {
    RegAreaId::new(PlmnId::new(1, 1), 0x20, 1)
}

/// RRC camped normally on [`CELL`] in [`area`], outboxes empty.
pub fn camped() -> Harness {
    let mut h = Harness {
        rrc: Rrc::new(&UeConfig::default()),
        svc: UeServices::new(),
    };
    h.rrc.power_on(&mut h.svc);
    h.rrc.handle_measurement(CELL, MetricKind::Rscp, -70.0, &mut h.svc);
    for block in [
        SystemInformationBlock::Master { value_tag: 1 },
        SystemInformationBlock::Sib1 { t3212_deci_hours: 0, attach_allowed: true },
        SystemInformationBlock::Sib3 { reg_area: area(), q_rxlev_min: -58 },
    ] {
        let msg = RrcMessage::SystemInformation { cell_id: CELL, block };
        h.rrc.handle_bearer_data(RB_BCCH, msg.encode(0), &mut h.svc);
    }
    drain(&mut h.svc);
    h.svc.take_lower_commands();
    h
}

/// Answers a pending RRC connection request and discards the resulting
/// `RrcEstablished` indications.
pub fn connect(h: &mut Harness) {
    let setup = RrcMessage::RrcConnectionSetup { ue_id: h.rrc.ue_id() };
    h.rrc.handle_bearer_data(RB_CCCH, setup.encode(0), &mut h.svc);
    drain(&mut h.svc);
}

/// NAS messages sent since the last call.
pub fn sent_nas(svc: &mut UeServices) -> Vec<NasPdu> {
    svc.take_lower_commands()
        .into_iter()
        .filter_map(|cmd| match cmd {
            LowerLayerCommand::SendOnBearer { rb: RB_DCCH_AM_NAS, data } => {
                match RrcMessage::decode(data).unwrap().1 {
                    RrcMessage::InitialDirectTransfer { nas, .. }
                    | RrcMessage::UplinkDirectTransfer { nas, .. } => Some(NasPdu::decode(nas).unwrap()),
                    _ => None,
                }
            }
            _ => None,
        })
        .collect()
}

pub fn drain(svc: &mut UeServices) -> Vec<Indication> {
    std::iter::from_fn(|| svc.next_indication()).collect()
}

/// Advances the clock to the next deadline and pops the timer.
pub fn fire_next(svc: &mut UeServices) -> (TimerHandle, TimerEvent) {
    let deadline = svc.timers.next_deadline().expect("no timer armed");
    svc.timers.advance(deadline);
    svc.timers.pop_due().expect("timer due")
}
