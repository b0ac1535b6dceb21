//! UE RRC (Radio Resource Control) Layer
//!
//! Implements the UE side of 3GPP TS 25.331 for the signalling procedures
//! the NAS layers depend on:
//! - PLMN search, cell selection and idle mode reselection (TS 25.304)
//! - System information acquisition
//! - RRC connection establishment, reject back-off and release
//! - Radio bearer setup/release for CS and PS radio access bearers
//! - Active set update and measurement reporting in CELL_DCH
//! - Direct transfer of NAS messages per CN domain
//!
//! # Architecture
//!
//! [`Rrc`] is a synchronous state machine. Downlink messages arrive through
//! [`Rrc::handle_bearer_data`], measurements through
//! [`Rrc::handle_measurement`] and expiries through [`Rrc::on_timer`]. Output
//! goes to the [`UeServices`] outboxes: lower layer commands, and
//! [`Indication`]s consumed by MM and GMM.
//!
//! # Radio bearers
//!
//! | RB | Use |
//! |----|-----|
//! | 0 | CCCH on RACH/FACH during establishment |
//! | 1 | DCCH, unacknowledged |
//! | 2 | DCCH, acknowledged, RRC |
//! | 3 | DCCH, acknowledged, NAS direct transfer |
//! | 5..=31 | user plane radio access bearers |
//!
//! Every bearer configured in the lower layer is released exactly once when
//! the connection goes away.

pub mod cell_tracker;
pub mod measurement;
pub mod state;

pub use cell_tracker::{CellRecord, CellSet, CellTracker, SibUpdate};
pub use measurement::MeasurementWindow;
pub use state::{ConnectedSubstate, IdleSubstate, RrcState, StateError};

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};
use umtsim_common::logging::{log_protocol_message, Direction};
use umtsim_common::{CellId, CnDomain, MeasurementParams, RrcParams, UeConfig};
use umtsim_l3::{
    ActiveSetAction, EstablishmentCause, L3Message, NasPdu, PagingCause, ProtocolDiscriminator,
    RrcMessage, SibType, SystemInformationBlock,
};

use crate::lower::{
    LowerLayerCommand, MetricKind, RbId, RlcMode, TransportChannel, DEDICATED_SIGNALLING_RBS,
    FIRST_USER_RB, LAST_USER_RB, RB_CCCH, RB_DCCH_AM_NAS, RB_DCCH_AM_RRC, RB_DCCH_UM,
};
use crate::services::{Indication, UeServices};
use crate::timer::{
    GuardedRetry, PeriodicInterval, RetryDecision, RrcTimer, TimerEvent, TimerHandle, TimerSlot,
    DEFAULT_RRC_WAIT_TIME, DEFAULT_T300_INTERVAL, DEFAULT_T308_INTERVAL, MAX_T300_RETRIES,
    MAX_T308_RETRIES,
};

/// Name used in protocol message logs.
pub(crate) fn protocol_name(pd: ProtocolDiscriminator) -> &'static str {
    match pd {
        ProtocolDiscriminator::Rr => "RRC",
        ProtocolDiscriminator::Mm => "MM",
        ProtocolDiscriminator::Gmm => "GMM",
        ProtocolDiscriminator::Cc => "CC",
        ProtocolDiscriminator::Sm => "SM",
        _ => "L3",
    }
}

/// Radio access bearer held by RRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RabInfo {
    pub rb: RbId,
    pub domain: CnDomain,
}

/// Pending connection establishment.
#[derive(Debug, Clone)]
struct Establishment {
    cause: EstablishmentCause,
    /// Domain named in RRC CONNECTION REQUEST
    initial_domain: CnDomain,
    /// Domains waiting for the connection
    requesters: [bool; 2],
}

impl Establishment {
    fn new(cause: EstablishmentCause, domain: CnDomain) -> Self {
        let mut requesters = [false; 2];
        requesters[domain.index()] = true;
        Self {
            cause,
            initial_domain: domain,
            requesters,
        }
    }

    fn domains(&self) -> impl Iterator<Item = CnDomain> + '_ {
        CnDomain::ALL.into_iter().filter(|d| self.requesters[d.index()])
    }
}

/// RRC entity of one UE.
#[derive(Debug)]
pub struct Rrc {
    ue_id: u32,
    params: RrcParams,
    meas: MeasurementParams,
    state: RrcState,
    cells: CellTracker,
    powered: bool,

    t300: GuardedRetry,
    t308: GuardedRetry,
    wait_timer: TimerSlot,
    cell_selection_timer: TimerSlot,
    cpich_timer: TimerSlot,
    meas_report_timer: TimerSlot,

    establishment: Option<Establishment>,
    /// RACH/FACH configured for the CCCH
    common_channels: bool,
    dch_configured: bool,
    /// Bearers currently configured in the lower layer
    configured_rbs: BTreeSet<RbId>,
    rabs: BTreeMap<u8, RabInfo>,
    /// Per-domain signalling connection flag
    signalling: [bool; 2],
    uplink_queue: VecDeque<NasPdu>,
    /// RRC CONNECTION RELEASE received, T308 running
    releasing: bool,
}

impl Rrc {
    pub fn new(config: &UeConfig) -> Self {
        Self {
            ue_id: config.imsi.short_id(),
            params: config.rrc.clone(),
            meas: config.measurement.clone(),
            state: RrcState::default(),
            cells: CellTracker::new(
                Duration::from_millis(config.measurement.window_ms),
                Duration::from_millis(config.measurement.obsolete_after_ms),
            ),
            powered: false,
            t300: GuardedRetry::new(TimerEvent::Rrc(RrcTimer::T300), DEFAULT_T300_INTERVAL, MAX_T300_RETRIES),
            t308: GuardedRetry::new(TimerEvent::Rrc(RrcTimer::T308), DEFAULT_T308_INTERVAL, MAX_T308_RETRIES),
            wait_timer: TimerSlot::new(),
            cell_selection_timer: TimerSlot::new(),
            cpich_timer: TimerSlot::new(),
            meas_report_timer: TimerSlot::new(),
            establishment: None,
            common_channels: false,
            dch_configured: false,
            configured_rbs: BTreeSet::new(),
            rabs: BTreeMap::new(),
            signalling: [false; 2],
            uplink_queue: VecDeque::new(),
            releasing: false,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> RrcState {
        self.state
    }

    pub fn ue_id(&self) -> u32 {
        self.ue_id
    }

    pub fn cells(&self) -> &CellTracker {
        &self.cells
    }

    pub fn primary_cell(&self) -> Option<CellId> {
        self.cells.primary()
    }

    /// True if `domain` holds a signalling connection.
    pub fn has_signalling(&self, domain: CnDomain) -> bool {
        self.signalling[domain.index()]
    }

    /// True while a connection request is outstanding or backing off.
    pub fn is_establishing(&self) -> bool {
        self.establishment.is_some()
    }

    /// Radio access bearers currently held.
    pub fn rabs(&self) -> &BTreeMap<u8, RabInfo> {
        &self.rabs
    }

    pub fn rb_for_rab(&self, rab_id: u8) -> Option<RbId> {
        self.rabs.get(&rab_id).map(|r| r.rb)
    }

    /// Bearers configured in the lower layer, signalling and user plane.
    pub fn configured_bearers(&self) -> impl Iterator<Item = RbId> + '_ {
        self.configured_rbs.iter().copied()
    }

    fn set_state(&mut self, new: RrcState) {
        if self.state != new {
            debug!("RRC state: {} -> {}", self.state, new);
            self.state = new;
        }
    }

    // ========================================================================
    // Power and cell selection
    // ========================================================================

    /// Starts the PLMN search and the periodic cell evaluation timers.
    pub fn power_on(&mut self, svc: &mut UeServices) {
        info!("RRC power on, searching for cells");
        self.powered = true;
        self.set_state(RrcState::Idle(IdleSubstate::NoPlmn));
        self.start_cell_search(svc);
        self.cpich_timer.arm(
            &mut svc.timers,
            Duration::from_millis(self.meas.check_interval_ms),
            TimerEvent::Rrc(RrcTimer::CpichCheck),
        );
        self.cell_selection_timer.arm(
            &mut svc.timers,
            self.params.cell_eval_time(),
            TimerEvent::Rrc(RrcTimer::CellSelection),
        );
    }

    /// Releases everything locally and stops all timers.
    pub fn power_off(&mut self, svc: &mut UeServices) {
        info!("RRC power off");
        self.release_connection(svc);
        self.handle_establishment_failure(svc);
        self.wait_timer.cancel(&mut svc.timers);
        self.cell_selection_timer.cancel(&mut svc.timers);
        self.cpich_timer.cancel(&mut svc.timers);
        self.cells.set_primary(None);
        self.set_state(RrcState::Idle(IdleSubstate::NoPlmn));
        self.powered = false;
    }

    fn start_cell_search(&mut self, svc: &mut UeServices) {
        svc.stats.rrc.cell_searches += 1;
        svc.push_lower(LowerLayerCommand::StartCellSearch);
    }

    /// Physical layer measurement of one cell.
    pub fn handle_measurement(&mut self, cell: CellId, metric: MetricKind, value: f64, svc: &mut UeServices) {
        if !self.powered {
            return;
        }
        self.cells.record_sample(cell, metric, value, svc.now());
        if metric == MetricKind::Rscp && self.state == RrcState::Idle(IdleSubstate::NoPlmn) {
            self.perform_cell_selection(svc);
        }
    }

    /// Idle mode cell selection and reselection.
    ///
    /// Without a primary cell the best suitable cell is selected. With one,
    /// a neighbour replaces it if the primary became unsuitable, or if the
    /// primary is below `s_search` and the neighbour beats it by `q_hyst`.
    fn perform_cell_selection(&mut self, svc: &mut UeServices) {
        if !self.state.should_perform_cell_selection() || self.establishment.is_some() {
            return;
        }
        let q_min = self.params.q_rxlev_min;
        let best = self.cells.best_cell(q_min);

        let Some(primary) = self.cells.primary() else {
            if let Some(cell) = best {
                self.select_cell(cell, false, svc);
            }
            return;
        };

        let primary_level = self.cells.level(primary).unwrap_or(f64::NEG_INFINITY);
        if primary_level < q_min {
            match best {
                Some(cell) => self.select_cell(cell, true, svc),
                None => self.lose_all_cells(svc),
            }
            return;
        }
        if primary_level >= self.params.s_search {
            return;
        }
        if let Some(cell) = best.filter(|c| *c != primary) {
            let level = self.cells.level(cell).unwrap_or(f64::NEG_INFINITY);
            if level > primary_level + self.params.q_hyst {
                self.select_cell(cell, true, svc);
            }
        }
    }

    fn select_cell(&mut self, cell: CellId, reselection: bool, svc: &mut UeServices) {
        if reselection {
            info!("Reselecting cell {} (was {:?})", cell, self.cells.primary());
            svc.stats.rrc.cell_reselections += 1;
        } else {
            info!("Selected cell {}", cell);
            svc.stats.rrc.cell_selections += 1;
        }
        self.cells.set_primary(Some(cell));
        self.set_state(RrcState::Idle(IdleSubstate::PlmnSelected));
        svc.push_lower(LowerLayerCommand::SelectCell { cell });
    }

    fn lose_all_cells(&mut self, svc: &mut UeServices) {
        warn!("No suitable cell available");
        self.cells.set_primary(None);
        self.set_state(RrcState::Idle(IdleSubstate::NoPlmn));
        svc.indicate(Indication::NoCellAvailable);
        self.start_cell_search(svc);
    }

    fn handle_system_information(&mut self, cell: CellId, block: SystemInformationBlock, svc: &mut UeServices) {
        if self.cells.primary() != Some(cell) {
            return;
        }
        let update = self.cells.apply_sib(cell, &block);
        let RrcState::Idle(sub) = self.state else {
            return;
        };
        if update == SibUpdate::ValueTagChanged && sub == IdleSubstate::CampedNormally {
            self.set_state(RrcState::Idle(IdleSubstate::SuitableCellSelected));
        }
        let Some(record) = self.cells.get(cell) else {
            return;
        };
        let sub = match self.state {
            RrcState::Idle(s) => s,
            RrcState::Connected(_) => return,
        };
        if sub == IdleSubstate::CampedNormally {
            return;
        }
        if record.system_information_complete() {
            let Some(area) = record.reg_area else {
                return;
            };
            let t3212 = record.t3212_deci_hours.map(PeriodicInterval::from_deci_hours);
            let attach_allowed = record.attach_allowed;
            info!("Camped normally on cell {} in {}", cell, area);
            self.set_state(RrcState::Idle(IdleSubstate::CampedNormally));
            svc.indicate(Indication::CellCamped {
                cell,
                area,
                t3212,
                attach_allowed,
            });
        } else if sub == IdleSubstate::PlmnSelected && record.has_sib(SibType::Master) {
            self.set_state(RrcState::Idle(IdleSubstate::SuitableCellSelected));
        }
    }

    fn handle_cpich_check(&mut self, svc: &mut UeServices) {
        let active_before = self.cells.active_set();
        let evicted = self.cells.evict_stale(svc.now());
        if !evicted.is_empty() {
            debug!("Evicted stale cells {:?}", evicted);
        }

        match self.state {
            RrcState::Connected(_) => {
                for cell in evicted.iter().filter(|c| active_before.contains(c)) {
                    svc.push_lower(LowerLayerCommand::ConfigureDownlink { cell: *cell, add: false });
                }
                let active = self.cells.active_set();
                if !active_before.is_empty() && active.is_empty() {
                    warn!("Active set empty after staleness sweep");
                    self.handle_radio_link_failure(svc);
                } else if self.cells.primary().is_none() {
                    self.cells.set_primary(active.first().copied());
                }
            }
            RrcState::Idle(IdleSubstate::NoPlmn) => {}
            RrcState::Idle(_) => {
                if self.cells.primary().is_none() && self.establishment.is_none() {
                    match self.cells.best_cell(self.params.q_rxlev_min) {
                        Some(cell) => self.select_cell(cell, true, svc),
                        None => self.lose_all_cells(svc),
                    }
                } else if self.cells.primary().is_none() {
                    self.handle_establishment_failure(svc);
                    self.lose_all_cells(svc);
                }
            }
        }
    }

    // ========================================================================
    // Uplink
    // ========================================================================

    fn send_rrc(&mut self, rb: RbId, msg: RrcMessage, svc: &mut UeServices) {
        let data = msg.encode(0);
        log_protocol_message("RRC", Direction::Tx, msg.name(), &data);
        svc.stats.count_sent(ProtocolDiscriminator::Rr);
        svc.push_lower(LowerLayerCommand::SendOnBearer { rb, data });
    }

    fn transmit_nas(&mut self, pdu: NasPdu, svc: &mut UeServices) {
        let domain = pdu.domain();
        let nas = pdu.encode();
        log_protocol_message(protocol_name(pdu.pd()), Direction::Tx, pdu.name(), &nas);
        svc.stats.count_sent(pdu.pd());
        let msg = if self.signalling[domain.index()] {
            RrcMessage::UplinkDirectTransfer { domain, nas }
        } else {
            debug!("Opening {} signalling connection", domain);
            self.signalling[domain.index()] = true;
            RrcMessage::InitialDirectTransfer { domain, nas }
        };
        self.send_rrc(RB_DCCH_AM_NAS, msg, svc);
    }

    /// Sends a NAS message, establishing the connection first if needed.
    ///
    /// While the connection is being established the message is queued and
    /// sent once RRC CONNECTION SETUP arrives. If no connection can be
    /// requested the message is dropped and `RrcEstablishFailed` is
    /// indicated for its domain.
    pub fn send_nas(&mut self, pdu: NasPdu, cause: EstablishmentCause, svc: &mut UeServices) {
        let domain = pdu.domain();
        if self.state.is_connected() {
            if self.releasing {
                warn!("Dropping {} while the RRC connection is released", pdu.name());
                svc.indicate(Indication::RrcEstablishFailed { domain });
                return;
            }
            self.transmit_nas(pdu, svc);
            return;
        }
        self.uplink_queue.push_back(pdu);
        if !self.request_connection(domain, cause, svc) {
            self.uplink_queue.retain(|p| p.domain() != domain);
        }
    }

    /// Requests a signalling connection for `domain`.
    ///
    /// Returns false (after indicating `RrcEstablishFailed`) if the UE is
    /// not camped normally.
    fn request_connection(&mut self, domain: CnDomain, cause: EstablishmentCause, svc: &mut UeServices) -> bool {
        if let Some(est) = &mut self.establishment {
            est.requesters[domain.index()] = true;
            return true;
        }
        if !self.state.is_camped() {
            warn!("Cannot establish RRC connection for {}: {}", domain, self.state);
            svc.indicate(Indication::RrcEstablishFailed { domain });
            return false;
        }
        self.establishment = Some(Establishment::new(cause, domain));
        if self.wait_timer.is_armed() {
            debug!("RRC connection request deferred until wait time expires");
            return true;
        }
        self.start_connection_establishment(svc);
        true
    }

    fn start_connection_establishment(&mut self, svc: &mut UeServices) {
        info!("Starting RRC connection establishment");
        svc.stats.rrc.connection_attempts += 1;
        self.configure_common_channels(svc);
        self.send_connection_request(svc);
        self.t300.start(&mut svc.timers);
    }

    fn send_connection_request(&mut self, svc: &mut UeServices) {
        let Some(est) = &self.establishment else {
            return;
        };
        let msg = RrcMessage::RrcConnectionRequest {
            ue_id: self.ue_id,
            cause: est.cause,
            domain: est.initial_domain,
        };
        self.send_rrc(RB_CCCH, msg, svc);
    }

    /// Sends SIGNALLING CONNECTION RELEASE INDICATION for `domain` and drops
    /// the domain's signalling connection locally.
    pub fn release_signalling(&mut self, domain: CnDomain, svc: &mut UeServices) {
        self.uplink_queue.retain(|p| p.domain() != domain);
        if !self.state.is_connected() || self.releasing || !self.signalling[domain.index()] {
            return;
        }
        info!("Releasing {} signalling connection", domain);
        svc.stats.rrc.signalling_release_indications += 1;
        self.send_rrc(
            RB_DCCH_AM_RRC,
            RrcMessage::SignallingConnectionReleaseIndication { domain },
            svc,
        );
        self.signalling[domain.index()] = false;
        svc.indicate(Indication::SignallingReleased { domain });
    }

    // ========================================================================
    // Bearer bookkeeping
    // ========================================================================

    fn configure_bearer(&mut self, rb: RbId, mode: RlcMode, channel: TransportChannel, svc: &mut UeServices) {
        if !self.configured_rbs.insert(rb) {
            error!("Radio bearer {} configured twice", rb);
            panic!("radio bearer {rb} configured twice");
        }
        svc.push_lower(LowerLayerCommand::ConfigureRadioBearer { rb, mode, channel });
    }

    fn release_bearer(&mut self, rb: RbId, svc: &mut UeServices) {
        if !self.configured_rbs.remove(&rb) {
            error!("Radio bearer {} released twice", rb);
            panic!("radio bearer {rb} released twice");
        }
        svc.push_lower(LowerLayerCommand::ReleaseRadioBearer { rb });
    }

    fn configure_common_channels(&mut self, svc: &mut UeServices) {
        if self.common_channels {
            return;
        }
        svc.push_lower(LowerLayerCommand::ConfigureChannel { channel: TransportChannel::Rach });
        svc.push_lower(LowerLayerCommand::ConfigureChannel { channel: TransportChannel::Fach });
        self.configure_bearer(RB_CCCH, RlcMode::Transparent, TransportChannel::Rach, svc);
        self.common_channels = true;
    }

    fn release_common_channels(&mut self, svc: &mut UeServices) {
        if !self.common_channels {
            return;
        }
        self.release_bearer(RB_CCCH, svc);
        svc.push_lower(LowerLayerCommand::ReleaseChannel { channel: TransportChannel::Rach });
        svc.push_lower(LowerLayerCommand::ReleaseChannel { channel: TransportChannel::Fach });
        self.common_channels = false;
    }

    /// Releases a radio access bearer whose flow is gone, without signalling.
    pub fn release_rab_local(&mut self, rab_id: u8, svc: &mut UeServices) {
        if let Some(info) = self.rabs.remove(&rab_id) {
            debug!("Releasing RAB {} (RB{}) locally", rab_id, info.rb);
            self.release_bearer(info.rb, svc);
        }
    }

    // ========================================================================
    // Downlink
    // ========================================================================

    /// Downlink RRC PDU on a signalling bearer, BCCH or PCCH.
    pub fn handle_bearer_data(&mut self, rb: RbId, data: Bytes, svc: &mut UeServices) {
        let msg = match RrcMessage::decode(data.clone()) {
            Ok((_, msg)) => msg,
            Err(e) => {
                warn!("Undecodable RRC PDU on RB{}: {}", rb, e);
                return;
            }
        };
        if !matches!(msg, RrcMessage::SystemInformation { .. }) {
            log_protocol_message("RRC", Direction::Rx, msg.name(), &data);
        }
        svc.stats.count_received(ProtocolDiscriminator::Rr);
        self.handle_message(msg, svc);
    }

    fn handle_message(&mut self, msg: RrcMessage, svc: &mut UeServices) {
        match msg {
            RrcMessage::SystemInformation { cell_id, block } => {
                self.handle_system_information(cell_id, block, svc)
            }
            RrcMessage::PagingType1 { ue_id, domain, cause } => {
                if ue_id == self.ue_id {
                    self.handle_paging(domain, cause, svc);
                }
            }
            RrcMessage::PagingType2 { domain, cause } => {
                if self.state.is_connected() {
                    self.handle_paging(domain, cause, svc);
                }
            }
            RrcMessage::RrcConnectionSetup { ue_id } => self.handle_rrc_setup(ue_id, svc),
            RrcMessage::RrcConnectionReject { ue_id, wait_time_s } => {
                self.handle_rrc_reject(ue_id, wait_time_s, svc)
            }
            RrcMessage::RrcConnectionRelease => self.handle_rrc_release(svc),
            RrcMessage::RadioBearerSetup { rab_id, domain, rb_id } => {
                self.handle_radio_bearer_setup(rab_id, domain, rb_id, svc)
            }
            RrcMessage::RadioBearerRelease { rab_id } => self.handle_radio_bearer_release(rab_id, svc),
            RrcMessage::ActiveSetUpdate { action, cell_id } => {
                self.handle_active_set_update(action, cell_id, svc)
            }
            RrcMessage::SignallingConnectionRelease { domain } => {
                if self.state.is_connected() && self.signalling[domain.index()] {
                    info!("Network released {} signalling connection", domain);
                    self.signalling[domain.index()] = false;
                    svc.indicate(Indication::SignallingReleased { domain });
                }
            }
            RrcMessage::DownlinkDirectTransfer { domain, nas } => {
                if !self.state.is_connected() {
                    warn!("DOWNLINK DIRECT TRANSFER in {}", self.state);
                    return;
                }
                self.signalling[domain.index()] = true;
                svc.indicate(Indication::NasReceived { domain, data: nas });
            }
            other => warn!("Unexpected downlink RRC message {}", other.name()),
        }
    }

    fn handle_paging(&mut self, domain: CnDomain, cause: PagingCause, svc: &mut UeServices) {
        if self.state.is_idle() && !self.state.is_camped() {
            debug!("Paging ignored in {}", self.state);
            return;
        }
        info!("Paged for {} ({:?})", domain, cause);
        svc.stats.rrc.pagings += 1;
        svc.indicate(Indication::Paged { domain, cause });
    }

    fn handle_rrc_setup(&mut self, ue_id: u32, svc: &mut UeServices) {
        if ue_id != self.ue_id {
            return;
        }
        let Some(est) = self.establishment.take() else {
            warn!("RRC CONNECTION SETUP without a pending request");
            return;
        };
        let target = RrcState::Connected(ConnectedSubstate::CellDch);
        if let Err(e) = self.state.check_transition(target) {
            warn!("Ignoring RRC CONNECTION SETUP: {}", e);
            self.establishment = Some(est);
            self.handle_establishment_failure(svc);
            return;
        }

        self.t300.stop(&mut svc.timers);
        self.release_common_channels(svc);
        svc.push_lower(LowerLayerCommand::ConfigureChannel { channel: TransportChannel::Dch });
        self.dch_configured = true;
        for rb in DEDICATED_SIGNALLING_RBS {
            let mode = if rb == RB_DCCH_UM {
                RlcMode::Unacknowledged
            } else {
                RlcMode::Acknowledged
            };
            self.configure_bearer(rb, mode, TransportChannel::Dch, svc);
        }
        self.set_state(target);
        info!("RRC connection established");
        svc.stats.rrc.connection_successes += 1;

        self.cells.move_all(CellSet::Detected, CellSet::Monitored);
        if let Some(primary) = self.cells.primary() {
            self.cells.set_membership(primary, CellSet::Active);
            svc.push_lower(LowerLayerCommand::ConfigureDownlink { cell: primary, add: true });
        }
        self.send_rrc(RB_DCCH_AM_RRC, RrcMessage::RrcConnectionSetupComplete, svc);

        for domain in est.domains() {
            svc.indicate(Indication::RrcEstablished { domain });
        }
        while let Some(pdu) = self.uplink_queue.pop_front() {
            self.transmit_nas(pdu, svc);
        }
        self.meas_report_timer.arm(
            &mut svc.timers,
            Duration::from_millis(self.meas.report_check_interval_ms),
            TimerEvent::Rrc(RrcTimer::MeasReportCheck),
        );
    }

    fn handle_rrc_reject(&mut self, ue_id: u32, wait_time_s: u8, svc: &mut UeServices) {
        if ue_id != self.ue_id || self.establishment.is_none() || self.wait_timer.is_armed() {
            return;
        }
        let wait = if wait_time_s == 0 {
            DEFAULT_RRC_WAIT_TIME
        } else {
            Duration::from_secs(u64::from(wait_time_s))
        };
        warn!("RRC connection rejected, waiting {:?}", wait);
        svc.stats.rrc.connection_rejects += 1;
        self.t300.stop(&mut svc.timers);
        self.release_common_channels(svc);
        self.wait_timer.arm(&mut svc.timers, wait, TimerEvent::Rrc(RrcTimer::WaitTime));
    }

    /// Gives up a pending establishment and reports failure to every
    /// requesting domain.
    fn handle_establishment_failure(&mut self, svc: &mut UeServices) {
        self.t300.stop(&mut svc.timers);
        self.wait_timer.cancel(&mut svc.timers);
        self.release_common_channels(svc);
        let Some(est) = self.establishment.take() else {
            return;
        };
        warn!("RRC connection establishment failed");
        svc.stats.rrc.connection_failures += 1;
        self.uplink_queue.clear();
        for domain in est.domains() {
            svc.indicate(Indication::RrcEstablishFailed { domain });
        }
    }

    fn handle_rrc_release(&mut self, svc: &mut UeServices) {
        if !self.state.is_connected() || self.releasing {
            debug!("RRC CONNECTION RELEASE ignored in {}", self.state);
            return;
        }
        info!("RRC connection release received");
        svc.stats.rrc.connection_releases += 1;
        self.releasing = true;
        self.send_rrc(RB_DCCH_UM, RrcMessage::RrcConnectionReleaseComplete, svc);
        self.t308.start(&mut svc.timers);
    }

    /// Local teardown of the connection.
    ///
    /// Releases every bearer and channel, reports the loss of both
    /// signalling connections and returns to idle mode. Calling it again
    /// without a new connection does nothing.
    fn release_connection(&mut self, svc: &mut UeServices) {
        if !self.state.is_connected() {
            return;
        }
        self.t308.stop(&mut svc.timers);
        self.meas_report_timer.cancel(&mut svc.timers);
        self.releasing = false;

        let rabs = std::mem::take(&mut self.rabs);
        for (rab_id, info) in rabs {
            self.release_bearer(info.rb, svc);
            svc.indicate(Indication::RabReleased { rab_id });
        }
        for rb in DEDICATED_SIGNALLING_RBS {
            if self.configured_rbs.contains(&rb) {
                self.release_bearer(rb, svc);
            }
        }
        if self.dch_configured {
            for cell in self.cells.active_set() {
                svc.push_lower(LowerLayerCommand::ConfigureDownlink { cell, add: false });
            }
            svc.push_lower(LowerLayerCommand::ReleaseChannel { channel: TransportChannel::Dch });
            self.dch_configured = false;
        }
        self.release_common_channels(svc);
        debug_assert!(self.configured_rbs.is_empty(), "bearers left after release");

        self.cells.move_all(CellSet::Active, CellSet::Detected);
        self.cells.move_all(CellSet::Monitored, CellSet::Detected);
        self.uplink_queue.clear();
        self.signalling = [false; 2];
        for domain in CnDomain::ALL {
            svc.indicate(Indication::SignallingReleased { domain });
        }

        let camped = self
            .cells
            .primary_record()
            .is_some_and(CellRecord::system_information_complete);
        if camped {
            self.set_state(RrcState::Idle(IdleSubstate::CampedNormally));
        } else {
            match self.cells.primary() {
                Some(cell) => {
                    self.set_state(RrcState::Idle(IdleSubstate::PlmnSelected));
                    svc.push_lower(LowerLayerCommand::SelectCell { cell });
                }
                None => self.set_state(RrcState::Idle(IdleSubstate::NoPlmn)),
            }
        }
        info!("RRC connection released, now {}", self.state);
    }

    /// Radio link failure: tear down locally, then reselect among the cells
    /// still tracked. The cell search restarts only when none is suitable.
    fn handle_radio_link_failure(&mut self, svc: &mut UeServices) {
        if !self.state.is_connected() {
            return;
        }
        warn!("Radio link failure");
        svc.stats.rrc.link_failures += 1;
        self.release_connection(svc);
        if self.cells.best_cell(self.params.q_rxlev_min).is_some() {
            self.perform_cell_selection(svc);
        } else {
            self.lose_all_cells(svc);
        }
    }

    /// Unrecoverable acknowledged-mode RLC error on `rb`.
    pub fn handle_am_rlc_error(&mut self, rb: RbId, svc: &mut UeServices) {
        if self.configured_rbs.contains(&rb) {
            warn!("Unrecoverable RLC error on RB{}", rb);
            self.handle_radio_link_failure(svc);
        }
    }

    fn handle_radio_bearer_setup(&mut self, rab_id: u8, domain: CnDomain, rb: RbId, svc: &mut UeServices) {
        if !self.state.is_connected() {
            warn!("RADIO BEARER SETUP in {}", self.state);
            return;
        }
        if !(FIRST_USER_RB..=LAST_USER_RB).contains(&rb) {
            warn!("RADIO BEARER SETUP for invalid RB{}", rb);
            return;
        }
        if self.rabs.contains_key(&rab_id) {
            debug!("RAB {} already established", rab_id);
        } else if self.configured_rbs.contains(&rb) {
            warn!("RADIO BEARER SETUP for RB{} already in use", rb);
            return;
        } else {
            let mode = match domain {
                CnDomain::Cs => RlcMode::Transparent,
                CnDomain::Ps => RlcMode::Acknowledged,
            };
            self.configure_bearer(rb, mode, TransportChannel::Dch, svc);
            self.rabs.insert(rab_id, RabInfo { rb, domain });
            info!("RAB {} established on RB{} ({})", rab_id, rb, domain);
            svc.indicate(Indication::RabEstablished { rab_id, rb, domain });
        }
        self.send_rrc(RB_DCCH_AM_RRC, RrcMessage::RadioBearerSetupComplete { rab_id }, svc);
    }

    fn handle_radio_bearer_release(&mut self, rab_id: u8, svc: &mut UeServices) {
        if !self.state.is_connected() {
            return;
        }
        if let Some(info) = self.rabs.remove(&rab_id) {
            info!("RAB {} released (RB{})", rab_id, info.rb);
            self.release_bearer(info.rb, svc);
            svc.indicate(Indication::RabReleased { rab_id });
        }
        self.send_rrc(RB_DCCH_AM_RRC, RrcMessage::RadioBearerReleaseComplete { rab_id }, svc);
    }

    fn handle_active_set_update(&mut self, action: ActiveSetAction, cell: CellId, svc: &mut UeServices) {
        if self.state != RrcState::Connected(ConnectedSubstate::CellDch) {
            warn!("ACTIVE SET UPDATE in {}", self.state);
            return;
        }
        svc.stats.rrc.active_set_updates += 1;
        let member = self.cells.get(cell).map(|c| c.set == CellSet::Active);
        match (action, member) {
            (ActiveSetAction::Add, Some(false)) if self.cells.active_set().len() < self.params.as_size_max => {
                debug!("Adding cell {} to the active set", cell);
                self.cells.set_membership(cell, CellSet::Active);
                svc.push_lower(LowerLayerCommand::ConfigureDownlink { cell, add: true });
                self.send_rrc(RB_DCCH_AM_RRC, RrcMessage::ActiveSetUpdateComplete { action, cell_id: cell }, svc);
            }
            (ActiveSetAction::Remove, Some(true)) => {
                debug!("Removing cell {} from the active set", cell);
                self.cells.set_membership(cell, CellSet::Monitored);
                svc.push_lower(LowerLayerCommand::ConfigureDownlink { cell, add: false });
                self.send_rrc(RB_DCCH_AM_RRC, RrcMessage::ActiveSetUpdateComplete { action, cell_id: cell }, svc);
                let active = self.cells.active_set();
                if active.is_empty() {
                    self.handle_radio_link_failure(svc);
                } else if self.cells.primary() == Some(cell) {
                    let best = active
                        .iter()
                        .copied()
                        .max_by(|a, b| {
                            let la = self.cells.level(*a).unwrap_or(f64::NEG_INFINITY);
                            let lb = self.cells.level(*b).unwrap_or(f64::NEG_INFINITY);
                            la.total_cmp(&lb)
                        });
                    self.cells.set_primary(best);
                }
            }
            _ => {
                warn!("ACTIVE SET UPDATE {:?} for cell {} cannot be applied", action, cell);
                self.send_rrc(RB_DCCH_AM_RRC, RrcMessage::ActiveSetUpdateFailure { cell_id: cell }, svc);
            }
        }
    }

    // ========================================================================
    // Measurement reporting
    // ========================================================================

    /// Checks the reporting events of the active set (3GPP TS 25.331 1A/1B/1C)
    /// and sends a MEASUREMENT REPORT if one is met.
    fn check_measurement_report(&mut self, svc: &mut UeServices) {
        if self.state != RrcState::Connected(ConnectedSubstate::CellDch) {
            return;
        }
        let Some(best) = self
            .cells
            .iter()
            .filter_map(CellRecord::level)
            .max_by(f64::total_cmp)
        else {
            return;
        };
        let hyst = self.params.as_threshold_hyst / 2.0;
        let drop_level = best - (self.params.as_threshold + hyst);
        let add_level = best - (self.params.as_threshold - hyst);

        let mut worst_active: Option<f64> = None;
        let mut triggered = false;
        let mut active_count = 0;
        for cell in self.cells.iter().filter(|c| c.set == CellSet::Active) {
            active_count += 1;
            let level = cell.level().unwrap_or(f64::NEG_INFINITY);
            worst_active = Some(worst_active.map_or(level, |w| w.min(level)));
            if level < drop_level {
                debug!("Cell {} dropped below the reporting range", cell.id);
                triggered = true;
            }
        }
        let full = active_count >= self.params.as_size_max;
        for cell in self.cells.iter().filter(|c| c.set != CellSet::Active) {
            let Some(level) = cell.level() else { continue };
            let add = !full && level > add_level;
            let replace = full && worst_active.is_some_and(|w| level > w + self.params.as_replace_hyst);
            if add || replace {
                debug!("Cell {} entered the reporting range", cell.id);
                triggered = true;
            }
        }

        if triggered {
            self.send_measurement_report(svc);
        }
    }

    fn send_measurement_report(&mut self, svc: &mut UeServices) {
        let measurements = self.cells.measurements();
        info!("Sending measurement report ({} cells)", measurements.len());
        svc.stats.rrc.measurement_reports += 1;
        self.cells.move_all(CellSet::Detected, CellSet::Monitored);
        self.send_rrc(RB_DCCH_AM_RRC, RrcMessage::MeasurementReport { measurements }, svc);
    }

    // ========================================================================
    // Timers
    // ========================================================================

    pub fn on_timer(&mut self, handle: TimerHandle, timer: RrcTimer, svc: &mut UeServices) {
        match timer {
            RrcTimer::T300 => match self.t300.on_expiry(handle) {
                RetryDecision::Stale => {}
                RetryDecision::Retry => {
                    debug!("T300 expired, retransmitting RRC CONNECTION REQUEST");
                    self.send_connection_request(svc);
                    self.t300.retry(&mut svc.timers);
                }
                RetryDecision::Exhausted => {
                    warn!("T300 expired {} times", self.t300.attempts());
                    self.handle_establishment_failure(svc);
                    self.perform_cell_selection(svc);
                }
            },
            RrcTimer::T308 => match self.t308.on_expiry(handle) {
                RetryDecision::Stale => {}
                RetryDecision::Retry => {
                    self.send_rrc(RB_DCCH_UM, RrcMessage::RrcConnectionReleaseComplete, svc);
                    self.t308.retry(&mut svc.timers);
                }
                RetryDecision::Exhausted => self.release_connection(svc),
            },
            RrcTimer::WaitTime => {
                if !self.wait_timer.take_if(handle) || self.establishment.is_none() {
                    return;
                }
                if self.state.is_camped() {
                    self.start_connection_establishment(svc);
                } else {
                    self.handle_establishment_failure(svc);
                }
            }
            RrcTimer::CellSelection => {
                if !self.cell_selection_timer.take_if(handle) {
                    return;
                }
                self.perform_cell_selection(svc);
                self.cell_selection_timer.arm(
                    &mut svc.timers,
                    self.params.cell_eval_time(),
                    TimerEvent::Rrc(RrcTimer::CellSelection),
                );
            }
            RrcTimer::CpichCheck => {
                if !self.cpich_timer.take_if(handle) {
                    return;
                }
                self.cpich_timer.arm(
                    &mut svc.timers,
                    Duration::from_millis(self.meas.check_interval_ms),
                    TimerEvent::Rrc(RrcTimer::CpichCheck),
                );
                self.handle_cpich_check(svc);
            }
            RrcTimer::MeasReportCheck => {
                if !self.meas_report_timer.take_if(handle) {
                    return;
                }
                self.check_measurement_report(svc);
                if self.state.is_connected() {
                    self.meas_report_timer.arm(
                        &mut svc.timers,
                        Duration::from_millis(self.meas.report_check_interval_ms),
                        TimerEvent::Rrc(RrcTimer::MeasReportCheck),
                    );
                }
            }
        }
    }
}
