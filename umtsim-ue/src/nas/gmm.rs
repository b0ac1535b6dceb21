//! GMM (GPRS Mobility Management) for the PS domain
//!
//! GMM attaches the UE to the packet core and provides SM with a PS
//! signalling connection. SM asks for one with
//! [`Gmm::request_ps_signalling`] and is answered asynchronously with
//! `PsSignallingReady` or `PsSignallingFailed`:
//!
//! | GMM state | PMM state | Action |
//! |-----------|-----------|--------|
//! | deregistered | - | attach with follow-on request |
//! | attach or RA update running | - | remember the follow-on |
//! | registered | connected | ready at once |
//! | registered | idle | SERVICE REQUEST (signalling) |
//! | service request running | - | nothing; the answer covers both |
//!
//! # Timers
//! - T3310 guards ATTACH REQUEST (4 transmissions)
//! - T3317 guards SERVICE REQUEST
//! - T3321 guards DETACH REQUEST (4 transmissions)
//! - T3330 guards ROUTING AREA UPDATE REQUEST (4 transmissions)
//! - T3312 runs in PMM-IDLE and triggers a periodic RA update

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};
use umtsim_common::{AttachMode, CnDomain, RegAreaId, UeConfig};
use umtsim_l3::{
    AttachType, EstablishmentCause, GmmMessage, GmmServiceType, L3Message, NasPdu, PagingCause,
    RaUpdateType, RejectCause,
};

use crate::rrc::Rrc;
use crate::services::{Indication, UeServices};
use crate::timer::{
    GmmTimer, GuardedRetry, RetryDecision, TimerEvent, TimerHandle, TimerSlot, DEFAULT_T3310_INTERVAL,
    DEFAULT_T3312_INTERVAL, DEFAULT_T3317_INTERVAL, DEFAULT_T3321_INTERVAL, DEFAULT_T3330_INTERVAL,
    MAX_T3310_RETRIES, MAX_T3321_RETRIES, MAX_T3330_RETRIES,
};

/// GMM-DEREGISTERED sub-states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeregSubstate {
    Normal,
    LimitedService,
    AttachNeeded,
    AttemptingToAttach,
    NoCellAvailable,
    PlmnSearch,
}

/// GMM-REGISTERED sub-states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegSubstate {
    NormalService,
    AttemptingToUpdate,
    NoCellAvailable,
    UpdateNeeded,
    LimitedService,
}

/// GMM main states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GmmState {
    #[default]
    Null,
    Deregistered(DeregSubstate),
    RegisteredInitiated,
    Registered(RegSubstate),
    DeregisteredInitiated,
    RoutingAreaUpdatingInitiated,
    ServiceRequestInitiated,
}

impl GmmState {
    /// Registered, including while an RA update or service request runs.
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            GmmState::Registered(_) | GmmState::RoutingAreaUpdatingInitiated | GmmState::ServiceRequestInitiated
        )
    }

    pub fn is_deregistered(&self) -> bool {
        matches!(self, GmmState::Deregistered(_))
    }
}

impl fmt::Display for GmmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GmmState::Null => write!(f, "GMM_NULL"),
            GmmState::Deregistered(s) => write!(f, "GMM_DEREGISTERED.{s:?}"),
            GmmState::RegisteredInitiated => write!(f, "GMM_REGISTERED_INITIATED"),
            GmmState::Registered(s) => write!(f, "GMM_REGISTERED.{s:?}"),
            GmmState::DeregisteredInitiated => write!(f, "GMM_DEREGISTERED_INITIATED"),
            GmmState::RoutingAreaUpdatingInitiated => write!(f, "GMM_ROUTING_AREA_UPDATING_INITIATED"),
            GmmState::ServiceRequestInitiated => write!(f, "GMM_SERVICE_REQUEST_INITIATED"),
        }
    }
}

/// Packet mobility management state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PmmState {
    #[default]
    Detached,
    Idle,
    Connected,
}

/// PS domain mobility management.
#[derive(Debug)]
pub struct Gmm {
    mode: AttachMode,
    state: GmmState,
    pmm: PmmState,
    ptmsi: Option<u32>,
    /// Routing area the UE is registered in
    area: Option<RegAreaId>,
    camped: Option<RegAreaId>,
    attach_allowed: bool,
    auto_attach: bool,

    t3310: GuardedRetry,
    t3312: TimerSlot,
    t3312_interval: Option<Duration>,
    t3317: TimerSlot,
    t3321: GuardedRetry,
    t3330: GuardedRetry,
    rau_type: RaUpdateType,

    /// SM is waiting for the procedure in progress
    follow_on: bool,
    /// Attach completed with nothing to do; the network releases the PS
    /// signalling connection
    attach_complete_wait_rel: bool,
}

impl Gmm {
    pub fn new(config: &UeConfig) -> Self {
        Self {
            mode: config.attach_mode,
            state: GmmState::Null,
            pmm: PmmState::Detached,
            ptmsi: None,
            area: None,
            camped: None,
            attach_allowed: true,
            auto_attach: config.attach_on_power_on,
            t3310: GuardedRetry::new(TimerEvent::Gmm(GmmTimer::T3310), DEFAULT_T3310_INTERVAL, MAX_T3310_RETRIES),
            t3312: TimerSlot::new(),
            t3312_interval: Some(
                config
                    .timers
                    .t3312_ms
                    .map_or(DEFAULT_T3312_INTERVAL, Duration::from_millis),
            ),
            t3317: TimerSlot::new(),
            t3321: GuardedRetry::new(TimerEvent::Gmm(GmmTimer::T3321), DEFAULT_T3321_INTERVAL, MAX_T3321_RETRIES),
            t3330: GuardedRetry::new(TimerEvent::Gmm(GmmTimer::T3330), DEFAULT_T3330_INTERVAL, MAX_T3330_RETRIES),
            rau_type: RaUpdateType::RaUpdating,
            follow_on: false,
            attach_complete_wait_rel: false,
        }
    }

    pub fn state(&self) -> GmmState {
        self.state
    }

    pub fn pmm_state(&self) -> PmmState {
        self.pmm
    }

    pub fn ptmsi(&self) -> Option<u32> {
        self.ptmsi
    }

    pub fn area(&self) -> Option<RegAreaId> {
        self.area
    }

    fn set_state(&mut self, new: GmmState) {
        if self.state != new {
            debug!("GMM state: {} -> {}", self.state, new);
            self.state = new;
        }
    }

    fn set_pmm(&mut self, new: PmmState) {
        if new != PmmState::Connected {
            self.attach_complete_wait_rel = false;
        }
        if self.pmm != new {
            debug!("PMM state: {:?} -> {:?}", self.pmm, new);
            self.pmm = new;
        }
    }

    fn send(&mut self, msg: GmmMessage, cause: EstablishmentCause, rrc: &mut Rrc, svc: &mut UeServices) {
        rrc.send_nas(NasPdu::Gmm(msg), cause, svc);
    }

    fn combined(&self) -> bool {
        self.mode == AttachMode::Combined
    }

    fn dereg_substate(&self) -> DeregSubstate {
        match self.camped {
            None => DeregSubstate::NoCellAvailable,
            Some(_) if !self.attach_allowed => DeregSubstate::LimitedService,
            Some(_) => DeregSubstate::Normal,
        }
    }

    fn stop_timers(&mut self, svc: &mut UeServices) {
        self.t3310.stop(&mut svc.timers);
        self.t3312.cancel(&mut svc.timers);
        self.t3317.cancel(&mut svc.timers);
        self.t3321.stop(&mut svc.timers);
        self.t3330.stop(&mut svc.timers);
    }

    // ========================================================================
    // Power and coverage
    // ========================================================================

    pub fn power_on(&mut self) {
        self.set_state(GmmState::Deregistered(DeregSubstate::PlmnSearch));
    }

    /// Power-off detach followed by local deregistration.
    pub fn power_off(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        if self.state.is_registered() {
            self.detach(true, rrc, svc);
        }
        self.stop_timers(svc);
        self.follow_on = false;
        self.set_pmm(PmmState::Detached);
        self.set_state(GmmState::Null);
    }

    /// RRC camped normally on a cell of `area`.
    pub fn on_cell_camped(&mut self, area: RegAreaId, attach_allowed: bool, rrc: &mut Rrc, svc: &mut UeServices) {
        self.camped = Some(area);
        self.attach_allowed = attach_allowed;
        match self.state {
            GmmState::Deregistered(_) => {
                if self.auto_attach && attach_allowed {
                    self.auto_attach = false;
                    self.start_attach(rrc, svc);
                } else {
                    self.set_state(GmmState::Deregistered(self.dereg_substate()));
                }
            }
            GmmState::Registered(_) => {
                if self.area != Some(area) {
                    let update_type = if self.combined() {
                        RaUpdateType::CombinedRaLaUpdating
                    } else {
                        RaUpdateType::RaUpdating
                    };
                    self.start_rau(update_type, rrc, svc);
                } else {
                    self.set_state(GmmState::Registered(RegSubstate::NormalService));
                }
            }
            _ => {}
        }
    }

    pub fn on_no_cell(&mut self) {
        self.camped = None;
        match self.state {
            GmmState::Deregistered(_) => self.set_state(GmmState::Deregistered(DeregSubstate::NoCellAvailable)),
            GmmState::Registered(_) => self.set_state(GmmState::Registered(RegSubstate::NoCellAvailable)),
            _ => {}
        }
    }

    // ========================================================================
    // PS signalling for SM
    // ========================================================================

    /// Asks for a PS signalling connection on behalf of SM.
    pub fn request_ps_signalling(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        self.attach_complete_wait_rel = false;
        match self.state {
            GmmState::Deregistered(_) if self.camped.is_some() && self.attach_allowed => {
                self.follow_on = true;
                self.start_attach(rrc, svc);
            }
            GmmState::RegisteredInitiated | GmmState::RoutingAreaUpdatingInitiated => {
                debug!("PS signalling request rides on the running procedure");
                self.follow_on = true;
            }
            GmmState::ServiceRequestInitiated => {}
            GmmState::Registered(_) if self.pmm == PmmState::Connected => {
                svc.indicate(Indication::PsSignallingReady);
            }
            GmmState::Registered(_) if self.camped.is_some() => {
                self.start_service_request(GmmServiceType::Signalling, EstablishmentCause::OriginatingInteractive, rrc, svc);
            }
            other => {
                warn!("PS signalling unavailable in {}", other);
                svc.indicate(Indication::PsSignallingFailed);
            }
        }
    }

    /// Gives up the PS signalling connection when SM no longer needs it.
    /// After a plain attach the release is left to the network.
    pub fn release_signalling(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        if self.attach_complete_wait_rel {
            debug!("PS signalling release awaited from the network");
            return;
        }
        if matches!(self.state, GmmState::Registered(_)) && self.pmm == PmmState::Connected {
            rrc.release_signalling(CnDomain::Ps, svc);
        }
    }

    fn start_service_request(
        &mut self,
        service_type: GmmServiceType,
        cause: EstablishmentCause,
        rrc: &mut Rrc,
        svc: &mut UeServices,
    ) {
        info!("Service request ({:?})", service_type);
        svc.stats.gmm.service_requests += 1;
        self.t3312.cancel(&mut svc.timers);
        self.set_state(GmmState::ServiceRequestInitiated);
        self.send(GmmMessage::ServiceRequest { service_type }, cause, rrc, svc);
        self.t3317.arm(&mut svc.timers, DEFAULT_T3317_INTERVAL, TimerEvent::Gmm(GmmTimer::T3317));
    }

    fn service_request_failed(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        self.t3317.cancel(&mut svc.timers);
        self.set_state(GmmState::Registered(RegSubstate::NormalService));
        svc.indicate(Indication::PsSignallingFailed);
        rrc.release_signalling(CnDomain::Ps, svc);
    }

    /// Paging for the PS domain.
    pub fn on_paged(&mut self, cause: PagingCause, rrc: &mut Rrc, svc: &mut UeServices) {
        if matches!(self.state, GmmState::Registered(_)) && self.pmm == PmmState::Idle {
            self.start_service_request(
                GmmServiceType::PagingResponse,
                EstablishmentCause::for_paging(cause),
                rrc,
                svc,
            );
        } else {
            debug!("PS paging ignored in {} / {:?}", self.state, self.pmm);
        }
    }

    // ========================================================================
    // Attach and detach
    // ========================================================================

    fn attach_request(&self) -> GmmMessage {
        GmmMessage::AttachRequest {
            attach_type: AttachType::new(self.combined(), self.follow_on),
            ptmsi: self.ptmsi,
            last_area: self.area.or(self.camped).unwrap_or_default(),
        }
    }

    fn start_attach(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        info!("GPRS attach ({:?})", self.mode);
        svc.stats.gmm.attach_attempts += 1;
        self.set_state(GmmState::RegisteredInitiated);
        let msg = self.attach_request();
        self.send(msg, EstablishmentCause::Registration, rrc, svc);
        self.t3310.start(&mut svc.timers);
    }

    fn handle_attach_accept(
        &mut self,
        ptmsi: Option<u32>,
        area: RegAreaId,
        t3312_min: Option<u8>,
        rrc: &mut Rrc,
        svc: &mut UeServices,
    ) {
        self.t3310.stop(&mut svc.timers);
        info!("GPRS attach accepted in {}", area);
        svc.stats.gmm.attaches += 1;
        self.apply_registration(ptmsi, area, t3312_min);
        self.set_state(GmmState::Registered(RegSubstate::NormalService));
        self.set_pmm(PmmState::Connected);
        self.send(GmmMessage::AttachComplete, EstablishmentCause::Registration, rrc, svc);
        if self.combined() {
            svc.indicate(Indication::CombinedAttachAccepted { area });
        }
        if std::mem::take(&mut self.follow_on) {
            svc.indicate(Indication::PsSignallingReady);
        } else {
            debug!("Attach complete, nothing pending");
            self.attach_complete_wait_rel = true;
        }
    }

    fn apply_registration(&mut self, ptmsi: Option<u32>, area: RegAreaId, t3312_min: Option<u8>) {
        if ptmsi.is_some() {
            self.ptmsi = ptmsi;
        }
        self.area = Some(area);
        if let Some(min) = t3312_min {
            self.t3312_interval = (min > 0).then(|| Duration::from_secs(u64::from(min) * 60));
        }
    }

    /// Hands the connection to SM if it asked for it, releases it otherwise.
    fn finish_procedure(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        if std::mem::take(&mut self.follow_on) {
            svc.indicate(Indication::PsSignallingReady);
        } else {
            rrc.release_signalling(CnDomain::Ps, svc);
        }
    }

    fn attach_failed(&mut self, cause: Option<RejectCause>, rrc: &mut Rrc, svc: &mut UeServices) {
        self.t3310.stop(&mut svc.timers);
        warn!("GPRS attach failed ({:?})", cause);
        svc.stats.gmm.attach_failures += 1;
        let sub = if cause.is_some_and(RejectCause::is_permanent) {
            DeregSubstate::LimitedService
        } else {
            DeregSubstate::AttemptingToAttach
        };
        self.set_state(GmmState::Deregistered(sub));
        self.set_pmm(PmmState::Detached);
        self.follow_on = false;
        svc.indicate(Indication::PsSignallingFailed);
        rrc.release_signalling(CnDomain::Ps, svc);
    }

    /// UE-initiated detach. A power-off detach completes locally.
    pub fn detach(&mut self, power_off: bool, rrc: &mut Rrc, svc: &mut UeServices) {
        match self.state {
            GmmState::RegisteredInitiated => {
                self.t3310.stop(&mut svc.timers);
                self.follow_on = false;
                svc.indicate(Indication::PsSignallingFailed);
                self.deregistered(rrc, svc);
                return;
            }
            s if !s.is_registered() => {
                debug!("Detach ignored in {}", s);
                return;
            }
            _ => {}
        }
        info!("GPRS detach (power off: {})", power_off);
        svc.stats.gmm.detaches += 1;
        self.t3317.cancel(&mut svc.timers);
        self.t3330.stop(&mut svc.timers);
        let msg = GmmMessage::DetachRequest { power_off, reattach_required: false, cause: None };
        self.send(msg, EstablishmentCause::Detach, rrc, svc);
        if power_off {
            self.deregistered(rrc, svc);
        } else {
            self.set_state(GmmState::DeregisteredInitiated);
            self.t3321.start(&mut svc.timers);
        }
    }

    /// Local deregistration: every PS context is gone.
    fn deregistered(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        self.stop_timers(svc);
        self.set_state(GmmState::Deregistered(self.dereg_substate()));
        self.set_pmm(PmmState::Detached);
        svc.indicate(Indication::PsDetached);
        rrc.release_signalling(CnDomain::Ps, svc);
    }

    fn handle_network_detach(&mut self, reattach_required: bool, rrc: &mut Rrc, svc: &mut UeServices) {
        info!("Network initiated detach (reattach: {})", reattach_required);
        self.send(GmmMessage::DetachAccept, EstablishmentCause::Registration, rrc, svc);
        self.stop_timers(svc);
        self.set_pmm(PmmState::Detached);
        self.follow_on = false;
        svc.indicate(Indication::PsDetached);
        if reattach_required && self.camped.is_some() {
            self.set_state(GmmState::Deregistered(DeregSubstate::AttachNeeded));
            self.start_attach(rrc, svc);
        } else {
            self.set_state(GmmState::Deregistered(self.dereg_substate()));
            rrc.release_signalling(CnDomain::Ps, svc);
        }
    }

    // ========================================================================
    // Routing area update
    // ========================================================================

    fn start_rau(&mut self, update_type: RaUpdateType, rrc: &mut Rrc, svc: &mut UeServices) {
        let Some(camped) = self.camped else {
            return;
        };
        info!("Routing area update ({:?}) in {}", update_type, camped);
        svc.stats.gmm.routing_area_updates += 1;
        self.rau_type = update_type;
        self.t3312.cancel(&mut svc.timers);
        self.set_state(GmmState::RoutingAreaUpdatingInitiated);
        self.send_rau_request(rrc, svc);
        self.t3330.start(&mut svc.timers);
    }

    fn send_rau_request(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        let msg = GmmMessage::RoutingAreaUpdateRequest {
            update_type: self.rau_type,
            last_area: self.area.or(self.camped).unwrap_or_default(),
        };
        self.send(msg, EstablishmentCause::Registration, rrc, svc);
    }

    fn handle_rau_accept(
        &mut self,
        ptmsi: Option<u32>,
        area: RegAreaId,
        t3312_min: Option<u8>,
        rrc: &mut Rrc,
        svc: &mut UeServices,
    ) {
        self.t3330.stop(&mut svc.timers);
        info!("Routing area update accepted in {}", area);
        self.apply_registration(ptmsi, area, t3312_min);
        self.set_state(GmmState::Registered(RegSubstate::NormalService));
        self.set_pmm(PmmState::Connected);
        self.send(GmmMessage::RoutingAreaUpdateComplete, EstablishmentCause::Registration, rrc, svc);
        if self.combined() && self.rau_type != RaUpdateType::RaUpdating && self.rau_type != RaUpdateType::Periodic {
            svc.indicate(Indication::CombinedAttachAccepted { area });
        }
        self.finish_procedure(rrc, svc);
    }

    fn rau_failed(&mut self, cause: Option<RejectCause>, rrc: &mut Rrc, svc: &mut UeServices) {
        self.t3330.stop(&mut svc.timers);
        warn!("Routing area update failed ({:?})", cause);
        if std::mem::take(&mut self.follow_on) {
            svc.indicate(Indication::PsSignallingFailed);
        }
        match cause {
            Some(c) if c.is_permanent() || c == RejectCause::ImplicitlyDetached => {
                self.deregistered(rrc, svc);
            }
            _ => {
                self.set_state(GmmState::Registered(RegSubstate::AttemptingToUpdate));
                rrc.release_signalling(CnDomain::Ps, svc);
            }
        }
    }

    // ========================================================================
    // Lower layer events
    // ========================================================================

    /// The PS signalling connection failed to come up or went away.
    pub fn on_signalling_lost(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        self.attach_complete_wait_rel = false;
        match self.state {
            GmmState::RegisteredInitiated => self.attach_failed(None, rrc, svc),
            GmmState::ServiceRequestInitiated => {
                warn!("Service request aborted by lower layer");
                self.service_request_failed(rrc, svc);
            }
            GmmState::RoutingAreaUpdatingInitiated => self.rau_failed(None, rrc, svc),
            GmmState::DeregisteredInitiated => self.deregistered(rrc, svc),
            _ => {}
        }
        if self.pmm == PmmState::Connected {
            self.set_pmm(PmmState::Idle);
        }
        if self.state.is_registered() && self.pmm == PmmState::Idle && !self.t3312.is_armed() {
            if let Some(interval) = self.t3312_interval {
                self.t3312.arm(&mut svc.timers, interval, TimerEvent::Gmm(GmmTimer::T3312));
            }
        }
    }

    /// Downlink GMM message.
    pub fn handle_message(&mut self, msg: GmmMessage, rrc: &mut Rrc, svc: &mut UeServices) {
        match (self.state, msg) {
            (GmmState::RegisteredInitiated, GmmMessage::AttachAccept { ptmsi, area, t3312_min }) => {
                self.handle_attach_accept(ptmsi, area, t3312_min, rrc, svc)
            }
            (GmmState::RegisteredInitiated, GmmMessage::AttachReject { cause }) => {
                self.attach_failed(Some(cause), rrc, svc)
            }
            (GmmState::ServiceRequestInitiated, GmmMessage::ServiceAccept) => {
                self.t3317.cancel(&mut svc.timers);
                info!("Service request accepted");
                self.set_state(GmmState::Registered(RegSubstate::NormalService));
                self.set_pmm(PmmState::Connected);
                svc.indicate(Indication::PsSignallingReady);
            }
            (GmmState::ServiceRequestInitiated, GmmMessage::ServiceReject { cause }) => {
                warn!("Service request rejected: {:?}", cause);
                self.service_request_failed(rrc, svc);
                if cause == RejectCause::ImplicitlyDetached {
                    self.deregistered(rrc, svc);
                }
            }
            (GmmState::DeregisteredInitiated, GmmMessage::DetachAccept) => {
                info!("Detach accepted");
                self.deregistered(rrc, svc);
            }
            (state, GmmMessage::DetachRequest { reattach_required, .. }) if state.is_registered() => {
                self.handle_network_detach(reattach_required, rrc, svc)
            }
            (GmmState::RoutingAreaUpdatingInitiated, GmmMessage::RoutingAreaUpdateAccept { ptmsi, area, t3312_min }) => {
                self.handle_rau_accept(ptmsi, area, t3312_min, rrc, svc)
            }
            (GmmState::RoutingAreaUpdatingInitiated, GmmMessage::RoutingAreaUpdateReject { cause }) => {
                self.rau_failed(Some(cause), rrc, svc)
            }
            (_, GmmMessage::GmmInformation) => debug!("GMM INFORMATION received"),
            (_, GmmMessage::GmmStatus { cause }) => warn!("GMM STATUS received: {:?}", cause),
            (state, other) => warn!("Unexpected {} in {}", other.name(), state),
        }
    }

    pub fn on_timer(&mut self, handle: TimerHandle, timer: GmmTimer, rrc: &mut Rrc, svc: &mut UeServices) {
        match timer {
            GmmTimer::T3310 => match self.t3310.on_expiry(handle) {
                RetryDecision::Stale => {}
                RetryDecision::Retry => {
                    debug!("T3310 expired, attempt {}", self.t3310.attempts());
                    let msg = self.attach_request();
                    self.send(msg, EstablishmentCause::Registration, rrc, svc);
                    self.t3310.retry(&mut svc.timers);
                }
                RetryDecision::Exhausted => self.attach_failed(None, rrc, svc),
            },
            GmmTimer::T3312 => {
                if self.t3312.take_if(handle) && matches!(self.state, GmmState::Registered(_)) {
                    self.start_rau(RaUpdateType::Periodic, rrc, svc);
                }
            }
            GmmTimer::T3317 => {
                if self.t3317.take_if(handle) {
                    warn!("T3317 expired");
                    self.service_request_failed(rrc, svc);
                }
            }
            GmmTimer::T3321 => match self.t3321.on_expiry(handle) {
                RetryDecision::Stale => {}
                RetryDecision::Retry => {
                    let msg = GmmMessage::DetachRequest { power_off: false, reattach_required: false, cause: None };
                    self.send(msg, EstablishmentCause::Detach, rrc, svc);
                    self.t3321.retry(&mut svc.timers);
                }
                RetryDecision::Exhausted => {
                    warn!("Detach not acknowledged, deregistering locally");
                    self.deregistered(rrc, svc);
                }
            },
            GmmTimer::T3330 => match self.t3330.on_expiry(handle) {
                RetryDecision::Stale => {}
                RetryDecision::Retry => {
                    self.send_rau_request(rrc, svc);
                    self.t3330.retry(&mut svc.timers);
                }
                RetryDecision::Exhausted => self.rau_failed(None, rrc, svc),
            },
        }
    }
}
