//! Mock UTRAN and core network for integration testing
//!
//! [`MockNetwork`] stands in for the RNC, MSC and SGSN of one UE. It consumes
//! the [`LowerLayerCommand`]s the UE issues, answers the RRC and NAS
//! procedures it recognises, and returns the downlink PDUs to deliver. Every
//! answer is immediate; the simulation clock is driven by the harness.
//!
//! The network allocates radio bearers itself, so RADIO BEARER SETUP always
//! precedes the NAS message that names the radio access bearer.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, warn};
use umtsim_common::{CnDomain, RegAreaId};
use umtsim_l3::{
    CcCause, CcMessage, GmmMessage, L3Message, MmMessage, NasPdu, PagingCause, RejectCause, RrcMessage,
    SmCause, SmMessage, TransactionId,
};
use umtsim_ue::lower::{RB_CCCH, RB_DCCH_AM_NAS, RB_DCCH_AM_RRC, RB_DCCH_UM, RB_PCCH};
use umtsim_ue::lower::{FIRST_USER_RB, LAST_USER_RB};
use umtsim_ue::{LowerLayerCommand, PeerId, RbId};

use crate::test_fixtures::home_cell;

/// First RAB identity used for circuit switched calls. PS bearers use the
/// NSAPI as RAB identity, which stays below this value.
pub const CS_RAB_BASE: u8 = 16;

/// How the network treats a mobile-originated SETUP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallBehaviour {
    /// CALL PROCEEDING, ALERTING, bearer setup and CONNECT
    #[default]
    Answer,
    /// CALL PROCEEDING and ALERTING only; the remote party never answers
    Ring,
    /// DISCONNECT with cause user busy
    Busy,
    /// No answer at all
    Silent,
}

/// Mock network configuration
#[derive(Debug, Clone)]
pub struct MockNetworkConfig {
    /// Area reported in registration accepts
    pub area: RegAreaId,
    /// Answer RRC CONNECTION REQUEST
    pub rrc_setup: bool,
    /// Wait time sent in RRC CONNECTION REJECT when `rrc_setup` is off; no
    /// answer at all if `None`
    pub rrc_reject_wait_s: Option<u8>,
    pub accept_location_update: bool,
    pub accept_attach: bool,
    pub accept_cm_service: bool,
    pub accept_pdp: bool,
    pub call_behaviour: CallBehaviour,
    /// Release the RRC connection once no domain holds signalling
    pub release_idle_connection: bool,
}

impl Default for MockNetworkConfig {
    fn default() -> Self {
        Self {
            area: home_cell().area,
            rrc_setup: true,
            rrc_reject_wait_s: None,
            accept_location_update: true,
            accept_attach: true,
            accept_cm_service: true,
            accept_pdp: true,
            call_behaviour: CallBehaviour::default(),
            release_idle_connection: true,
        }
    }
}

/// Events observed by the mock network
#[derive(Debug, Clone, PartialEq)]
pub enum MockNetworkEvent {
    RrcConnectionRequested { ue_id: u32 },
    RrcConnectionReleased,
    /// SIGNALLING CONNECTION RELEASE INDICATION
    SignallingReleaseIndication { domain: CnDomain },
    /// Uplink NAS message; `initial` for INITIAL DIRECT TRANSFER
    Nas { domain: CnDomain, initial: bool, pdu: NasPdu },
    /// Uplink user plane PDU
    UserData { rb: RbId, data: Bytes },
    MeasurementReport,
}

/// Call as the network sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MockCall {
    rab_id: Option<u8>,
}

/// Mock RNC plus core network for one UE
#[derive(Debug)]
pub struct MockNetwork {
    config: MockNetworkConfig,
    events: Vec<MockNetworkEvent>,
    /// UE identity of the current RRC connection
    connection: Option<u32>,
    releasing: bool,
    signalling: [bool; 2],
    /// Radio access bearers by RAB identity
    rabs: BTreeMap<u8, RbId>,
    /// Calls by (TI value, originated by the UE)
    calls: BTreeMap<(u8, bool), MockCall>,
    next_tmsi: u32,
    next_ptmsi: u32,
    next_mt_ti: u8,
    /// The last ATTACH REQUEST asked to keep the connection
    attach_follow_on: bool,
    /// Incoming call delivered once the UE answers paging
    pending_mt_call: Option<(PeerId, u32)>,
}

impl MockNetwork {
    /// Create a new mock network with default configuration
    pub fn new() -> Self {
        Self::with_config(MockNetworkConfig::default())
    }

    pub fn with_config(config: MockNetworkConfig) -> Self {
        Self {
            config,
            events: Vec::new(),
            connection: None,
            releasing: false,
            signalling: [false; 2],
            rabs: BTreeMap::new(),
            calls: BTreeMap::new(),
            next_tmsi: 0x1000,
            next_ptmsi: 0x8000,
            next_mt_ti: 0,
            attach_follow_on: false,
            pending_mt_call: None,
        }
    }

    pub fn config(&self) -> &MockNetworkConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut MockNetworkConfig {
        &mut self.config
    }

    pub fn events(&self) -> &[MockNetworkEvent] {
        &self.events
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Number of radio access bearers the network holds.
    pub fn rab_count(&self) -> usize {
        self.rabs.len()
    }

    /// Uplink NAS messages, oldest first.
    pub fn uplink_nas(&self) -> Vec<&NasPdu> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MockNetworkEvent::Nas { pdu, .. } => Some(pdu),
                _ => None,
            })
            .collect()
    }

    /// Number of uplink NAS messages matching `pred`.
    pub fn count_nas(&self, pred: impl Fn(&NasPdu) -> bool) -> usize {
        self.uplink_nas().into_iter().filter(|p| pred(p)).count()
    }

    /// Uplink user plane PDUs, oldest first.
    pub fn user_data(&self) -> Vec<(RbId, Bytes)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MockNetworkEvent::UserData { rb, data } => Some((*rb, data.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn connection_requests(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, MockNetworkEvent::RrcConnectionRequested { .. }))
            .count()
    }

    // ========================================================================
    // Network initiated procedures
    // ========================================================================

    /// Pages the UE for an incoming call from `peer`. The SETUP follows the
    /// PAGING RESPONSE. Returns the PCCH PDU to deliver.
    pub fn page_for_call(&mut self, ue_id: u32, peer: PeerId, app_id: u32) -> (RbId, Bytes) {
        self.pending_mt_call = Some((peer, app_id));
        let paging = RrcMessage::PagingType1 {
            ue_id,
            domain: CnDomain::Cs,
            cause: PagingCause::ConversationalCall,
        };
        (RB_PCCH, paging.encode(0))
    }

    /// Downlink NAS message on the current connection.
    pub fn downlink_nas(&mut self, pdu: &NasPdu) -> Vec<(RbId, Bytes)> {
        let mut out = Vec::new();
        self.send_nas(pdu.clone(), &mut out);
        out
    }

    /// RRC CONNECTION RELEASE regardless of what the UE still holds.
    pub fn release_connection(&mut self) -> Vec<(RbId, Bytes)> {
        if self.connection.is_none() || self.releasing {
            return Vec::new();
        }
        self.releasing = true;
        vec![(RB_DCCH_AM_RRC, RrcMessage::RrcConnectionRelease.encode(0))]
    }

    /// Network-initiated PDP context deactivation for the context whose
    /// UE-side transaction identifier is `ti`.
    pub fn deactivate_pdp(&mut self, ti: u8, rab_id: u8) -> Vec<(RbId, Bytes)> {
        let mut out = Vec::new();
        self.release_rab(rab_id, &mut out);
        let msg = SmMessage::DeactivatePdpContextRequest { cause: SmCause::RegularDeactivation };
        self.send_nas(NasPdu::Sm { ti: TransactionId::new(ti, true), msg }, &mut out);
        out
    }

    // ========================================================================
    // Uplink
    // ========================================================================

    /// Consumes one command of the UE and returns the downlink PDUs it
    /// provokes.
    pub fn handle_command(&mut self, cmd: &LowerLayerCommand) -> Vec<(RbId, Bytes)> {
        let mut out = Vec::new();
        if let LowerLayerCommand::SendOnBearer { rb, data } = cmd {
            match *rb {
                RB_CCCH | RB_DCCH_UM | RB_DCCH_AM_RRC | RB_DCCH_AM_NAS => self.handle_rrc(data.clone(), &mut out),
                rb if (FIRST_USER_RB..=LAST_USER_RB).contains(&rb) => {
                    self.events.push(MockNetworkEvent::UserData { rb, data: data.clone() });
                }
                rb => warn!("Uplink PDU on unexpected RB{}", rb),
            }
        }
        out
    }

    fn handle_rrc(&mut self, data: Bytes, out: &mut Vec<(RbId, Bytes)>) {
        let msg = match RrcMessage::decode(data) {
            Ok((_, msg)) => msg,
            Err(e) => {
                warn!("Mock network cannot decode uplink RRC: {}", e);
                return;
            }
        };
        debug!("Mock network received {}", msg.name());
        match msg {
            RrcMessage::RrcConnectionRequest { ue_id, .. } => {
                self.events.push(MockNetworkEvent::RrcConnectionRequested { ue_id });
                // a request means the UE dropped any earlier connection
                self.reset_connection();
                if self.config.rrc_setup {
                    self.connection = Some(ue_id);
                    out.push((RB_CCCH, RrcMessage::RrcConnectionSetup { ue_id }.encode(0)));
                } else if let Some(wait_time_s) = self.config.rrc_reject_wait_s {
                    out.push((RB_CCCH, RrcMessage::RrcConnectionReject { ue_id, wait_time_s }.encode(0)));
                }
            }
            RrcMessage::RrcConnectionReleaseComplete => {
                if self.connection.is_some() {
                    self.events.push(MockNetworkEvent::RrcConnectionReleased);
                }
                self.reset_connection();
            }
            RrcMessage::SignallingConnectionReleaseIndication { domain } => {
                self.events.push(MockNetworkEvent::SignallingReleaseIndication { domain });
                self.signalling[domain.index()] = false;
                self.release_if_idle(out);
            }
            RrcMessage::InitialDirectTransfer { domain, nas } => self.handle_direct_transfer(domain, true, nas, out),
            RrcMessage::UplinkDirectTransfer { domain, nas } => self.handle_direct_transfer(domain, false, nas, out),
            RrcMessage::MeasurementReport { .. } => self.events.push(MockNetworkEvent::MeasurementReport),
            _ => {}
        }
    }

    fn reset_connection(&mut self) {
        self.connection = None;
        self.releasing = false;
        self.signalling = [false; 2];
        self.rabs.clear();
        for call in self.calls.values_mut() {
            call.rab_id = None;
        }
    }

    fn release_if_idle(&mut self, out: &mut Vec<(RbId, Bytes)>) {
        if self.config.release_idle_connection
            && self.connection.is_some()
            && !self.releasing
            && self.signalling.iter().all(|s| !s)
        {
            debug!("Mock network releasing the RRC connection");
            self.releasing = true;
            out.push((RB_DCCH_AM_RRC, RrcMessage::RrcConnectionRelease.encode(0)));
        }
    }

    fn handle_direct_transfer(&mut self, domain: CnDomain, initial: bool, nas: Bytes, out: &mut Vec<(RbId, Bytes)>) {
        let pdu = match NasPdu::decode(nas) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("Mock network cannot decode uplink NAS: {}", e);
                return;
            }
        };
        self.signalling[domain.index()] = true;
        self.events.push(MockNetworkEvent::Nas { domain, initial, pdu: pdu.clone() });
        match pdu {
            NasPdu::Mm(msg) => self.handle_mm(msg, out),
            NasPdu::Gmm(msg) => self.handle_gmm(msg, out),
            NasPdu::Cc { ti, msg } => self.handle_cc(ti, msg, out),
            NasPdu::Sm { ti, msg } => self.handle_sm(ti, msg, out),
        }
    }

    // ========================================================================
    // Downlink helpers
    // ========================================================================

    fn send_nas(&mut self, pdu: NasPdu, out: &mut Vec<(RbId, Bytes)>) {
        let domain = pdu.domain();
        self.signalling[domain.index()] = true;
        let msg = RrcMessage::DownlinkDirectTransfer { domain, nas: pdu.encode() };
        out.push((RB_DCCH_AM_NAS, msg.encode(0)));
    }

    fn free_rb(&self) -> Option<RbId> {
        (FIRST_USER_RB..=LAST_USER_RB).find(|rb| !self.rabs.values().any(|used| used == rb))
    }

    fn setup_rab(&mut self, rab_id: u8, domain: CnDomain, out: &mut Vec<(RbId, Bytes)>) -> Option<u8> {
        if self.rabs.contains_key(&rab_id) {
            return Some(rab_id);
        }
        let rb_id = self.free_rb()?;
        self.rabs.insert(rab_id, rb_id);
        out.push((RB_DCCH_AM_RRC, RrcMessage::RadioBearerSetup { rab_id, domain, rb_id }.encode(0)));
        Some(rab_id)
    }

    fn release_rab(&mut self, rab_id: u8, out: &mut Vec<(RbId, Bytes)>) {
        if self.rabs.remove(&rab_id).is_some() {
            out.push((RB_DCCH_AM_RRC, RrcMessage::RadioBearerRelease { rab_id }.encode(0)));
        }
    }

    // ========================================================================
    // NAS procedures
    // ========================================================================

    fn handle_mm(&mut self, msg: MmMessage, out: &mut Vec<(RbId, Bytes)>) {
        match msg {
            MmMessage::LocationUpdatingRequest { .. } => {
                let reply = if self.config.accept_location_update {
                    let tmsi = self.next_tmsi;
                    self.next_tmsi += 1;
                    MmMessage::LocationUpdatingAccept {
                        area: self.config.area,
                        tmsi: Some(tmsi),
                        t3212_deci_hours: None,
                    }
                } else {
                    MmMessage::LocationUpdatingReject { cause: RejectCause::LocationAreaNotAllowed }
                };
                self.send_nas(NasPdu::Mm(reply), out);
            }
            MmMessage::CmServiceRequest { .. } => {
                let reply = if self.config.accept_cm_service {
                    MmMessage::CmServiceAccept
                } else {
                    MmMessage::CmServiceReject { cause: RejectCause::Congestion }
                };
                self.send_nas(NasPdu::Mm(reply), out);
            }
            MmMessage::PagingResponse { .. } => {
                if let Some((peer, app_id)) = self.pending_mt_call.take() {
                    let value = self.next_mt_ti;
                    self.next_mt_ti = (self.next_mt_ti + 1) % (TransactionId::MAX_VALUE + 1);
                    self.calls.insert((value, false), MockCall { rab_id: None });
                    let msg = CcMessage::Setup { peer, app_id, duration_ms: 0 };
                    self.send_nas(NasPdu::Cc { ti: TransactionId::new(value, false), msg }, out);
                }
            }
            MmMessage::ImsiDetachIndication { .. } => {
                self.signalling[CnDomain::Cs.index()] = false;
            }
            _ => {}
        }
    }

    /// Takes PS signalling back, releasing the whole connection when CS
    /// holds none either.
    fn release_ps_signalling(&mut self, out: &mut Vec<(RbId, Bytes)>) {
        self.signalling[CnDomain::Ps.index()] = false;
        if self.signalling[CnDomain::Cs.index()] || !self.config.release_idle_connection {
            let msg = RrcMessage::SignallingConnectionRelease { domain: CnDomain::Ps };
            out.push((RB_DCCH_AM_RRC, msg.encode(0)));
        } else {
            self.release_if_idle(out);
        }
    }

    fn handle_gmm(&mut self, msg: GmmMessage, out: &mut Vec<(RbId, Bytes)>) {
        let reply = match msg {
            GmmMessage::AttachComplete => {
                if !self.attach_follow_on {
                    debug!("Mock network releasing PS signalling after attach");
                    self.release_ps_signalling(out);
                }
                return;
            }
            GmmMessage::AttachRequest { attach_type, .. } if self.config.accept_attach => {
                self.attach_follow_on = attach_type.follow_on();
                let ptmsi = self.next_ptmsi;
                self.next_ptmsi += 1;
                GmmMessage::AttachAccept { ptmsi: Some(ptmsi), area: self.config.area, t3312_min: None }
            }
            GmmMessage::AttachRequest { .. } => GmmMessage::AttachReject { cause: RejectCause::GprsServicesNotAllowed },
            GmmMessage::RoutingAreaUpdateRequest { .. } => GmmMessage::RoutingAreaUpdateAccept {
                ptmsi: None,
                area: self.config.area,
                t3312_min: None,
            },
            GmmMessage::ServiceRequest { .. } => GmmMessage::ServiceAccept,
            GmmMessage::DetachRequest { power_off: false, .. } => GmmMessage::DetachAccept,
            _ => return,
        };
        self.send_nas(NasPdu::Gmm(reply), out);
    }

    fn handle_cc(&mut self, ti: TransactionId, msg: CcMessage, out: &mut Vec<(RbId, Bytes)>) {
        // the UE sets the flag only on transactions the network started
        let key = (ti.value, !ti.flag);
        let reply_ti = TransactionId::new(ti.value, !ti.flag);
        let reply = |msg| NasPdu::Cc { ti: reply_ti, msg };
        let rab_id = CS_RAB_BASE + ti.value;

        match msg {
            CcMessage::Setup { .. } => {
                self.calls.insert(key, MockCall { rab_id: None });
                match self.config.call_behaviour {
                    CallBehaviour::Silent => {}
                    CallBehaviour::Busy => {
                        self.send_nas(reply(CcMessage::Disconnect { cause: CcCause::UserBusy }), out);
                    }
                    behaviour => {
                        self.send_nas(reply(CcMessage::CallProceeding), out);
                        self.send_nas(reply(CcMessage::Alerting), out);
                        if behaviour == CallBehaviour::Answer {
                            let rab = self.setup_rab(rab_id, CnDomain::Cs, out);
                            if let Some(call) = self.calls.get_mut(&key) {
                                call.rab_id = rab;
                            }
                            self.send_nas(reply(CcMessage::Connect { rab_id: rab }), out);
                        }
                    }
                }
            }
            CcMessage::Connect { .. } => {
                // incoming call answered
                let rab = self.setup_rab(rab_id, CnDomain::Cs, out);
                if let Some(call) = self.calls.get_mut(&key) {
                    call.rab_id = rab;
                }
                self.send_nas(reply(CcMessage::ConnectAcknowledge { rab_id: rab }), out);
            }
            CcMessage::Disconnect { .. } => {
                if let Some(rab) = self.calls.get(&key).and_then(|c| c.rab_id) {
                    self.release_rab(rab, out);
                }
                self.send_nas(reply(CcMessage::Release { cause: CcCause::NormalCallClearing }), out);
            }
            CcMessage::Release { .. } => {
                if let Some(call) = self.calls.remove(&key) {
                    if let Some(rab) = call.rab_id {
                        self.release_rab(rab, out);
                    }
                }
                self.send_nas(reply(CcMessage::ReleaseComplete { cause: CcCause::NormalCallClearing }), out);
            }
            CcMessage::ReleaseComplete { .. } => {
                self.calls.remove(&key);
            }
            _ => {}
        }
    }

    fn handle_sm(&mut self, ti: TransactionId, msg: SmMessage, out: &mut Vec<(RbId, Bytes)>) {
        let reply_ti = TransactionId::new(ti.value, !ti.flag);
        match msg {
            SmMessage::ActivatePdpContextRequest { nsapi, qos, .. } => {
                let reply = if self.config.accept_pdp {
                    match self.setup_rab(nsapi, CnDomain::Ps, out) {
                        Some(rab_id) => SmMessage::ActivatePdpContextAccept { rab_id, qos },
                        None => SmMessage::ActivatePdpContextReject { cause: SmCause::InsufficientResources },
                    }
                } else {
                    SmMessage::ActivatePdpContextReject { cause: SmCause::ActivationRejectedUnspecified }
                };
                self.send_nas(NasPdu::Sm { ti: reply_ti, msg: reply }, out);
            }
            SmMessage::DeactivatePdpContextRequest { .. } => {
                // the context's RAB carries the NSAPI, which the network
                // learnt at activation
                let nsapi = self.events.iter().rev().find_map(|e| match e {
                    MockNetworkEvent::Nas {
                        pdu: NasPdu::Sm { ti: t, msg: SmMessage::ActivatePdpContextRequest { nsapi, .. } },
                        ..
                    } if t.value == ti.value => Some(*nsapi),
                    _ => None,
                });
                if let Some(rab_id) = nsapi {
                    self.release_rab(rab_id, out);
                }
                self.send_nas(NasPdu::Sm { ti: reply_ti, msg: SmMessage::DeactivatePdpContextAccept }, out);
            }
            _ => {}
        }
    }
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umtsim_l3::{AttachType, EstablishmentCause, LocationUpdateType};

    fn uplink(rb: RbId, msg: RrcMessage) -> LowerLayerCommand {
        LowerLayerCommand::SendOnBearer { rb, data: msg.encode(0) }
    }

    fn decode(out: &[(RbId, Bytes)]) -> Vec<RrcMessage> {
        out.iter()
            .map(|(_, data)| RrcMessage::decode(data.clone()).unwrap().1)
            .collect()
    }

    fn connect(net: &mut MockNetwork) {
        let request = RrcMessage::RrcConnectionRequest {
            ue_id: 7,
            cause: EstablishmentCause::Registration,
            domain: CnDomain::Cs,
        };
        let out = net.handle_command(&uplink(RB_CCCH, request));
        assert_eq!(decode(&out), vec![RrcMessage::RrcConnectionSetup { ue_id: 7 }]);
    }

    #[test]
    fn test_location_update_accepted() {
        let mut net = MockNetwork::new();
        connect(&mut net);
        let lu = NasPdu::Mm(MmMessage::LocationUpdatingRequest {
            update_type: LocationUpdateType::ImsiAttach,
            last_area: home_cell().area,
            tmsi: None,
        });
        let out = net.handle_command(&uplink(
            RB_DCCH_AM_NAS,
            RrcMessage::InitialDirectTransfer { domain: CnDomain::Cs, nas: lu.encode() },
        ));
        let msgs = decode(&out);
        let [RrcMessage::DownlinkDirectTransfer { domain: CnDomain::Cs, nas }] = msgs.as_slice() else {
            panic!("expected one direct transfer");
        };
        assert!(matches!(
            NasPdu::decode(nas.clone()).unwrap(),
            NasPdu::Mm(MmMessage::LocationUpdatingAccept { tmsi: Some(0x1000), .. })
        ));
        assert_eq!(net.uplink_nas().len(), 1);
    }

    #[test]
    fn test_connection_released_when_signalling_idle() {
        let mut net = MockNetwork::new();
        connect(&mut net);
        let indication = RrcMessage::SignallingConnectionReleaseIndication { domain: CnDomain::Cs };
        let out = net.handle_command(&uplink(RB_DCCH_AM_RRC, indication));
        assert_eq!(decode(&out), vec![RrcMessage::RrcConnectionRelease]);

        net.handle_command(&uplink(RB_DCCH_UM, RrcMessage::RrcConnectionReleaseComplete));
        assert!(!net.is_connected());
        assert!(net.events().contains(&MockNetworkEvent::RrcConnectionReleased));
    }

    fn uplink_gmm(net: &mut MockNetwork, msg: GmmMessage) -> Vec<RrcMessage> {
        let pdu = NasPdu::Gmm(msg);
        let transfer = RrcMessage::UplinkDirectTransfer { domain: CnDomain::Ps, nas: pdu.encode() };
        decode(&net.handle_command(&uplink(RB_DCCH_AM_NAS, transfer)))
    }

    #[test]
    fn test_plain_attach_released_by_network() {
        let mut net = MockNetwork::new();
        connect(&mut net);
        let request = GmmMessage::AttachRequest {
            attach_type: AttachType::GprsOnly,
            ptmsi: None,
            last_area: home_cell().area,
        };
        assert_eq!(uplink_gmm(&mut net, request).len(), 1);
        assert_eq!(uplink_gmm(&mut net, GmmMessage::AttachComplete), vec![RrcMessage::RrcConnectionRelease]);
    }

    #[test]
    fn test_follow_on_attach_keeps_connection() {
        let mut net = MockNetwork::new();
        connect(&mut net);
        let request = GmmMessage::AttachRequest {
            attach_type: AttachType::GprsOnlyFollowOn,
            ptmsi: None,
            last_area: home_cell().area,
        };
        uplink_gmm(&mut net, request);
        assert!(uplink_gmm(&mut net, GmmMessage::AttachComplete).is_empty());
        assert!(net.is_connected());
    }

    #[test]
    fn test_answered_call_gets_bearer_before_connect() {
        let mut net = MockNetwork::new();
        connect(&mut net);
        let setup = NasPdu::Cc {
            ti: TransactionId::new(0, false),
            msg: CcMessage::Setup { peer: 9, app_id: 1, duration_ms: 0 },
        };
        let out = net.handle_command(&uplink(
            RB_DCCH_AM_NAS,
            RrcMessage::UplinkDirectTransfer { domain: CnDomain::Cs, nas: setup.encode() },
        ));
        let msgs = decode(&out);
        assert_eq!(msgs.len(), 4);
        assert_eq!(
            msgs[2],
            RrcMessage::RadioBearerSetup { rab_id: CS_RAB_BASE, domain: CnDomain::Cs, rb_id: FIRST_USER_RB }
        );
        assert_eq!(net.rab_count(), 1);
    }

    #[test]
    fn test_user_data_recorded() {
        let mut net = MockNetwork::new();
        let data = Bytes::from_static(b"voice");
        assert!(net
            .handle_command(&LowerLayerCommand::SendOnBearer { rb: 7, data: data.clone() })
            .is_empty());
        assert_eq!(net.user_data(), vec![(7, data)]);
    }
}
