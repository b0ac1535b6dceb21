//! MM (Mobility Management) for the CS domain
//!
//! MM keeps the UE registered in a location area and brokers the single CS
//! signalling connection between the CC transactions that need it.
//!
//! # MM connections
//!
//! At most one CM SERVICE REQUEST is in flight. Further requests wait in a
//! FIFO queue and are sent one at a time as earlier ones are accepted, so a
//! second call never needs a second RRC connection. Each key is tracked in
//! exactly one of: the queue, the in-flight slot, the active set.
//!
//! # Location updating
//!
//! | Trigger | Type |
//! |---------|------|
//! | first registration after power on | IMSI attach |
//! | location area change | normal |
//! | T3212 expiry | periodic |
//! | T3211 expiry | retry of the previous type |
//!
//! A location update that becomes due while MM connections exist is run
//! once the connection is released.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};
use umtsim_common::{AttachMode, CnDomain, RegAreaId, UeConfig};
use umtsim_l3::{
    CmServiceType, EstablishmentCause, L3Message, LocationUpdateType, MmMessage, NasPdu, PagingCause, RejectCause,
};

use super::{MmConnFailure, MmConnKey};
use crate::rrc::Rrc;
use crate::services::{Indication, UeServices};
use crate::timer::{
    MmTimer, PeriodicInterval, TimerEvent, TimerHandle, TimerSlot, DEFAULT_T3210_INTERVAL,
    DEFAULT_T3211_INTERVAL, DEFAULT_T3212_INTERVAL, DEFAULT_T3230_INTERVAL, DEFAULT_T3240_INTERVAL,
    MAX_LU_ATTEMPTS,
};

/// MM-IDLE sub-states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MmIdleSubstate {
    NormalService,
    AttemptingToUpdate,
    LimitedService,
    NoCellAvailable,
    LocationUpdateNeeded,
    PlmnSearch,
}

/// MM main states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MmState {
    #[default]
    Null,
    Idle(MmIdleSubstate),
    LocationUpdatingInitiated,
    WaitForOutgoingMmConnection,
    WaitForAdditionalOutgoingMmConnection,
    MmConnectionActive,
    WaitForNetworkCommand,
    LocationUpdateRejected,
    ImsiDetachInitiated,
}

impl MmState {
    pub fn is_idle(&self) -> bool {
        matches!(self, MmState::Idle(_))
    }
}

impl fmt::Display for MmIdleSubstate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MmIdleSubstate::NormalService => "NORMAL_SERVICE",
            MmIdleSubstate::AttemptingToUpdate => "ATTEMPTING_TO_UPDATE",
            MmIdleSubstate::LimitedService => "LIMITED_SERVICE",
            MmIdleSubstate::NoCellAvailable => "NO_CELL_AVAILABLE",
            MmIdleSubstate::LocationUpdateNeeded => "LOCATION_UPDATE_NEEDED",
            MmIdleSubstate::PlmnSearch => "PLMN_SEARCH",
        };
        f.write_str(s)
    }
}

impl fmt::Display for MmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmState::Null => write!(f, "MM_NULL"),
            MmState::Idle(s) => write!(f, "MM_IDLE.{s}"),
            MmState::LocationUpdatingInitiated => write!(f, "MM_LOCATION_UPDATING_INITIATED"),
            MmState::WaitForOutgoingMmConnection => write!(f, "MM_WAIT_FOR_OUTGOING_MM_CONNECTION"),
            MmState::WaitForAdditionalOutgoingMmConnection => {
                write!(f, "MM_WAIT_FOR_ADDITIONAL_OUTGOING_MM_CONNECTION")
            }
            MmState::MmConnectionActive => write!(f, "MM_CONNECTION_ACTIVE"),
            MmState::WaitForNetworkCommand => write!(f, "MM_WAIT_FOR_NETWORK_COMMAND"),
            MmState::LocationUpdateRejected => write!(f, "MM_LOCATION_UPDATE_REJECTED"),
            MmState::ImsiDetachInitiated => write!(f, "MM_IMSI_DETACH_INITIATED"),
        }
    }
}

/// Update status (TS 24.008 4.1.2.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateStatus {
    Updated,
    #[default]
    NotUpdated,
    RoamingNotAllowed,
}

/// CS domain mobility management.
#[derive(Debug)]
pub struct Mm {
    state: MmState,
    status: UpdateStatus,
    tmsi: Option<u32>,
    /// Area of the last successful location update
    area: Option<RegAreaId>,
    /// Area of the cell camped on
    camped: Option<RegAreaId>,
    /// Location area where the network refused service
    forbidden: Option<RegAreaId>,

    t3212_broadcast: Option<PeriodicInterval>,
    t3212_network: Option<PeriodicInterval>,
    t3212_override: Option<Duration>,
    t3240_interval: Duration,

    pending: VecDeque<MmConnKey>,
    in_flight: Option<MmConnKey>,
    active: BTreeSet<MmConnKey>,

    t3210: TimerSlot,
    t3211: TimerSlot,
    t3212: TimerSlot,
    t3230: TimerSlot,
    t3240: TimerSlot,

    lu_attempts: u32,
    lu_type: LocationUpdateType,
    lu_needed: bool,
    registered_once: bool,
    /// Combined attach registers the CS domain; no IMSI attach of its own
    defer_to_combined: bool,
}

impl Mm {
    pub fn new(config: &UeConfig) -> Self {
        Self {
            state: MmState::Null,
            status: UpdateStatus::NotUpdated,
            tmsi: config.tmsi,
            area: None,
            camped: None,
            forbidden: None,
            t3212_broadcast: None,
            t3212_network: None,
            t3212_override: config.timers.t3212_ms.map(Duration::from_millis),
            t3240_interval: config
                .timers
                .t3240_ms
                .map_or(DEFAULT_T3240_INTERVAL, Duration::from_millis),
            pending: VecDeque::new(),
            in_flight: None,
            active: BTreeSet::new(),
            t3210: TimerSlot::new(),
            t3211: TimerSlot::new(),
            t3212: TimerSlot::new(),
            t3230: TimerSlot::new(),
            t3240: TimerSlot::new(),
            lu_attempts: 0,
            lu_type: LocationUpdateType::ImsiAttach,
            lu_needed: false,
            registered_once: false,
            defer_to_combined: config.attach_mode == AttachMode::Combined && config.attach_on_power_on,
        }
    }

    pub fn state(&self) -> MmState {
        self.state
    }

    pub fn update_status(&self) -> UpdateStatus {
        self.status
    }

    pub fn tmsi(&self) -> Option<u32> {
        self.tmsi
    }

    pub fn area(&self) -> Option<RegAreaId> {
        self.area
    }

    pub fn has_connection(&self, key: MmConnKey) -> bool {
        self.active.contains(&key)
    }

    pub fn active_connections(&self) -> usize {
        self.active.len()
    }

    pub fn queued_requests(&self) -> usize {
        self.pending.len()
    }

    fn set_state(&mut self, new: MmState) {
        if self.state != new {
            debug!("MM state: {} -> {}", self.state, new);
            self.state = new;
        }
    }

    fn check_bookkeeping(&self) {
        debug_assert!(
            self.in_flight.map_or(true, |k| !self.active.contains(&k) && !self.pending.contains(&k)),
            "MM connection {:?} tracked twice",
            self.in_flight
        );
        debug_assert!(
            self.pending.iter().all(|k| !self.active.contains(k)),
            "queued MM connection already active"
        );
    }

    fn is_tracked(&self, key: MmConnKey) -> bool {
        self.in_flight == Some(key) || self.active.contains(&key) || self.pending.contains(&key)
    }

    fn send(&mut self, msg: MmMessage, cause: EstablishmentCause, rrc: &mut Rrc, svc: &mut UeServices) {
        rrc.send_nas(NasPdu::Mm(msg), cause, svc);
    }

    /// Idle sub-state matching the current registration and coverage.
    fn idle_substate(&self) -> MmIdleSubstate {
        let Some(camped) = self.camped else {
            return MmIdleSubstate::NoCellAvailable;
        };
        if self.forbidden.is_some_and(|f| f.same_location_area(&camped)) {
            return MmIdleSubstate::LimitedService;
        }
        match self.status {
            UpdateStatus::Updated if self.area.is_some_and(|a| a.same_location_area(&camped)) => {
                MmIdleSubstate::NormalService
            }
            UpdateStatus::RoamingNotAllowed => MmIdleSubstate::LimitedService,
            _ if self.t3211.is_armed() || self.lu_attempts > 0 => MmIdleSubstate::AttemptingToUpdate,
            _ => MmIdleSubstate::LocationUpdateNeeded,
        }
    }

    /// Returns to MM-IDLE and runs a location update that was held back
    /// while the connection was in use.
    fn enter_idle(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        self.set_state(MmState::Idle(self.idle_substate()));
        if self.lu_needed {
            self.lu_needed = false;
            self.start_location_update(self.lu_type, rrc, svc);
        }
    }

    fn fail_requests(&mut self, failure: MmConnFailure, svc: &mut UeServices) {
        for key in self.in_flight.take().into_iter().chain(self.pending.drain(..)) {
            debug!("MM connection {} failed: {}", key, failure);
            svc.indicate(Indication::MmConnectionFailed { key, failure });
        }
    }

    // ========================================================================
    // Power and coverage
    // ========================================================================

    pub fn power_on(&mut self) {
        self.set_state(MmState::Idle(MmIdleSubstate::PlmnSearch));
    }

    /// Stops every timer and forgets the connections. An IMSI DETACH
    /// INDICATION is sent first if the UE is registered.
    pub fn power_off(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        if self.status == UpdateStatus::Updated && self.camped.is_some() {
            self.imsi_detach(rrc, svc);
        }
        for slot in [&mut self.t3210, &mut self.t3211, &mut self.t3212, &mut self.t3230, &mut self.t3240] {
            slot.cancel(&mut svc.timers);
        }
        self.in_flight = None;
        self.pending.clear();
        self.active.clear();
        self.lu_needed = false;
        self.set_state(MmState::Null);
    }

    /// RRC camped normally on a cell of `area`.
    pub fn on_cell_camped(
        &mut self,
        area: RegAreaId,
        t3212: Option<PeriodicInterval>,
        rrc: &mut Rrc,
        svc: &mut UeServices,
    ) {
        if self.state == MmState::Null {
            return;
        }
        self.t3212_broadcast = t3212;
        let changed = self.camped.map_or(true, |c| !c.same_location_area(&area));
        self.camped = Some(area);

        if self.defer_to_combined && !self.registered_once {
            debug!("MM waits for combined attach in {}", area);
            if self.state.is_idle() {
                self.set_state(MmState::Idle(MmIdleSubstate::LocationUpdateNeeded));
            }
            return;
        }
        if self.forbidden.is_some_and(|f| f.same_location_area(&area)) {
            if self.state.is_idle() {
                self.set_state(MmState::Idle(MmIdleSubstate::LimitedService));
            }
            return;
        }

        let update_type = if !self.registered_once {
            Some(LocationUpdateType::ImsiAttach)
        } else if self.status != UpdateStatus::Updated
            || self.area.map_or(true, |a| !a.same_location_area(&area))
        {
            Some(LocationUpdateType::Normal)
        } else {
            None
        };

        match update_type {
            Some(t) if changed || self.state.is_idle() => self.start_location_update(t, rrc, svc),
            _ if self.state.is_idle() => self.set_state(MmState::Idle(self.idle_substate())),
            _ => {}
        }
    }

    /// Every cell was lost.
    pub fn on_no_cell(&mut self) {
        self.camped = None;
        if self.state.is_idle() {
            self.set_state(MmState::Idle(MmIdleSubstate::NoCellAvailable));
        }
    }

    /// Combined GPRS attach also attached the IMSI in `area`.
    pub fn on_combined_attach(&mut self, area: RegAreaId) {
        info!("IMSI attached by combined attach in {}", area);
        self.status = UpdateStatus::Updated;
        self.area = Some(area);
        self.registered_once = true;
        self.defer_to_combined = false;
        self.lu_attempts = 0;
        if self.state.is_idle() {
            self.set_state(MmState::Idle(self.idle_substate()));
        }
    }

    /// Sends IMSI DETACH INDICATION and marks the UE not updated.
    pub fn imsi_detach(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        if self.status != UpdateStatus::Updated {
            return;
        }
        info!("IMSI detach");
        self.set_state(MmState::ImsiDetachInitiated);
        self.send(MmMessage::ImsiDetachIndication { tmsi: self.tmsi }, EstablishmentCause::Detach, rrc, svc);
        self.status = UpdateStatus::NotUpdated;
        self.registered_once = false;
        self.t3212.cancel(&mut svc.timers);
        self.t3240.cancel(&mut svc.timers);
        self.t3240.arm(&mut svc.timers, self.t3240_interval, TimerEvent::Mm(MmTimer::T3240));
    }

    // ========================================================================
    // Location updating
    // ========================================================================

    fn start_location_update(&mut self, update_type: LocationUpdateType, rrc: &mut Rrc, svc: &mut UeServices) {
        let Some(camped) = self.camped else {
            return;
        };
        self.lu_type = update_type;
        match self.state {
            MmState::LocationUpdatingInitiated | MmState::Null => return,
            MmState::Idle(_) => {}
            MmState::WaitForNetworkCommand | MmState::LocationUpdateRejected => {
                self.t3240.cancel(&mut svc.timers);
            }
            _ => {
                debug!("Location update ({:?}) deferred until MM connections are released", update_type);
                self.lu_needed = true;
                return;
            }
        }
        self.t3211.cancel(&mut svc.timers);
        self.lu_needed = false;

        info!("Location updating ({:?}) in {}", update_type, camped);
        svc.stats.mm.location_updates += 1;
        self.set_state(MmState::LocationUpdatingInitiated);
        let msg = MmMessage::LocationUpdatingRequest {
            update_type,
            last_area: self.area.unwrap_or(camped),
            tmsi: self.tmsi,
        };
        self.send(msg, EstablishmentCause::Registration, rrc, svc);
        self.t3210.arm(&mut svc.timers, DEFAULT_T3210_INTERVAL, TimerEvent::Mm(MmTimer::T3210));
    }

    /// The configured override wins, then the value of the last accept,
    /// then the broadcast one. A signalled zero disables the timer.
    fn t3212_interval(&self) -> Option<Duration> {
        if self.t3212_override.is_some() {
            return self.t3212_override;
        }
        match self.t3212_network.or(self.t3212_broadcast) {
            Some(signalled) => signalled.duration(),
            None => Some(DEFAULT_T3212_INTERVAL),
        }
    }

    fn arm_t3212(&mut self, svc: &mut UeServices) {
        self.t3212.cancel(&mut svc.timers);
        if let Some(interval) = self.t3212_interval() {
            self.t3212.arm(&mut svc.timers, interval, TimerEvent::Mm(MmTimer::T3212));
        }
    }

    fn handle_lu_accept(
        &mut self,
        area: RegAreaId,
        tmsi: Option<u32>,
        t3212_deci_hours: Option<u8>,
        rrc: &mut Rrc,
        svc: &mut UeServices,
    ) {
        self.t3210.cancel(&mut svc.timers);
        info!("Location updating accepted in {}", area);
        self.status = UpdateStatus::Updated;
        self.area = Some(area);
        self.forbidden = None;
        if tmsi.is_some() {
            self.tmsi = tmsi;
        }
        if let Some(v) = t3212_deci_hours {
            self.t3212_network = Some(PeriodicInterval::from_deci_hours(v));
        }
        self.registered_once = true;
        self.lu_attempts = 0;
        self.arm_t3212(svc);

        self.set_state(MmState::WaitForNetworkCommand);
        self.send_next_pending(rrc, svc);
        if self.in_flight.is_none() {
            self.t3240.arm(&mut svc.timers, self.t3240_interval, TimerEvent::Mm(MmTimer::T3240));
        }
    }

    fn handle_lu_reject(&mut self, cause: RejectCause, svc: &mut UeServices) {
        self.t3210.cancel(&mut svc.timers);
        warn!("Location updating rejected: {:?}", cause);
        svc.stats.mm.location_update_failures += 1;
        self.fail_requests(MmConnFailure::Rejected(cause), svc);
        if cause.is_permanent() {
            self.status = UpdateStatus::RoamingNotAllowed;
            self.forbidden = self.camped;
            self.lu_attempts = 0;
        } else {
            self.register_lu_failure(svc);
        }
        // the network releases the connection; T3240 covers a silent network
        self.set_state(MmState::LocationUpdateRejected);
        self.t3240.arm(&mut svc.timers, self.t3240_interval, TimerEvent::Mm(MmTimer::T3240));
    }

    /// Counts a failed attempt and schedules the next one.
    fn register_lu_failure(&mut self, svc: &mut UeServices) {
        self.status = UpdateStatus::NotUpdated;
        self.lu_attempts += 1;
        self.t3211.cancel(&mut svc.timers);
        if self.lu_attempts < MAX_LU_ATTEMPTS {
            self.t3211.arm(&mut svc.timers, DEFAULT_T3211_INTERVAL, TimerEvent::Mm(MmTimer::T3211));
        } else {
            warn!("Location updating failed {} times", self.lu_attempts);
            self.lu_attempts = 0;
            self.arm_t3212(svc);
        }
    }

    /// Location update aborted by T3210 or a lower layer failure.
    fn location_update_failed(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        self.t3210.cancel(&mut svc.timers);
        svc.stats.mm.location_update_failures += 1;
        self.fail_requests(MmConnFailure::LowerLayer, svc);
        self.register_lu_failure(svc);
        self.set_state(MmState::Idle(MmIdleSubstate::AttemptingToUpdate));
        rrc.release_signalling(CnDomain::Cs, svc);
    }

    // ========================================================================
    // MM connections
    // ========================================================================

    /// Requests an MM connection for a CC transaction.
    ///
    /// The outcome is reported later as `MmConnectionActive` or
    /// `MmConnectionFailed` for `key`.
    pub fn request_mm_connection(&mut self, key: MmConnKey, rrc: &mut Rrc, svc: &mut UeServices) {
        if self.is_tracked(key) {
            warn!("MM connection {} requested twice", key);
            return;
        }
        match self.state {
            MmState::Idle(MmIdleSubstate::NormalService) if self.status == UpdateStatus::Updated => {
                self.send_cm_service_request(key, rrc, svc);
            }
            MmState::MmConnectionActive | MmState::WaitForNetworkCommand if self.in_flight.is_none() => {
                self.t3240.cancel(&mut svc.timers);
                self.send_cm_service_request(key, rrc, svc);
            }
            MmState::MmConnectionActive
            | MmState::WaitForOutgoingMmConnection
            | MmState::WaitForAdditionalOutgoingMmConnection
            | MmState::LocationUpdatingInitiated => {
                debug!("MM connection {} queued", key);
                self.pending.push_back(key);
            }
            MmState::Idle(MmIdleSubstate::AttemptingToUpdate | MmIdleSubstate::LocationUpdateNeeded)
                if self.camped.is_some() && !self.defer_to_combined =>
            {
                debug!("MM connection {} waits for location update", key);
                self.pending.push_back(key);
                let update_type = if self.registered_once {
                    self.lu_type
                } else {
                    LocationUpdateType::ImsiAttach
                };
                self.start_location_update(update_type, rrc, svc);
            }
            other => {
                warn!("MM connection {} refused in {}", key, other);
                svc.indicate(Indication::MmConnectionFailed {
                    key,
                    failure: MmConnFailure::NotRegistered,
                });
            }
        }
        self.check_bookkeeping();
    }

    fn send_cm_service_request(&mut self, key: MmConnKey, rrc: &mut Rrc, svc: &mut UeServices) {
        debug!("CM service request for {}", key);
        svc.stats.mm.cm_service_requests += 1;
        self.in_flight = Some(key);
        self.set_state(if self.active.is_empty() {
            MmState::WaitForOutgoingMmConnection
        } else {
            MmState::WaitForAdditionalOutgoingMmConnection
        });
        let msg = MmMessage::CmServiceRequest {
            service_type: CmServiceType::MobileOriginatingCall,
            tmsi: self.tmsi,
        };
        self.send(msg, EstablishmentCause::OriginatingConversational, rrc, svc);
        self.t3230.arm(&mut svc.timers, DEFAULT_T3230_INTERVAL, TimerEvent::Mm(MmTimer::T3230));
    }

    fn send_next_pending(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        if self.in_flight.is_some() {
            return;
        }
        if let Some(key) = self.pending.pop_front() {
            self.t3240.cancel(&mut svc.timers);
            self.send_cm_service_request(key, rrc, svc);
        }
    }

    /// Network-initiated MM connection (incoming call).
    pub fn on_mt_connection(&mut self, key: MmConnKey, svc: &mut UeServices) {
        self.t3240.cancel(&mut svc.timers);
        self.active.insert(key);
        if self.in_flight.is_none() {
            self.set_state(MmState::MmConnectionActive);
        }
        self.check_bookkeeping();
    }

    /// Releases the MM connection of a finished transaction. Unknown keys
    /// are ignored.
    pub fn release_mm_connection(&mut self, key: MmConnKey, rrc: &mut Rrc, svc: &mut UeServices) {
        if self.active.remove(&key) {
            debug!("MM connection {} released", key);
        } else if self.in_flight == Some(key) {
            debug!("MM connection {} aborted", key);
            self.in_flight = None;
            self.t3230.cancel(&mut svc.timers);
            self.send(MmMessage::CmServiceAbort, EstablishmentCause::OriginatingConversational, rrc, svc);
        } else {
            if let Some(pos) = self.pending.iter().position(|k| *k == key) {
                self.pending.remove(pos);
            }
            return;
        }

        self.send_next_pending(rrc, svc);
        if self.in_flight.is_none() {
            if self.active.is_empty() {
                self.set_state(MmState::WaitForNetworkCommand);
                self.t3240.cancel(&mut svc.timers);
                self.t3240.arm(&mut svc.timers, self.t3240_interval, TimerEvent::Mm(MmTimer::T3240));
            } else {
                self.set_state(MmState::MmConnectionActive);
            }
        }
        self.check_bookkeeping();
    }

    fn handle_cm_service_accept(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        let Some(key) = self.in_flight.take() else {
            warn!("CM SERVICE ACCEPT without a pending request");
            return;
        };
        self.t3230.cancel(&mut svc.timers);
        info!("MM connection {} established", key);
        self.active.insert(key);
        self.set_state(MmState::MmConnectionActive);
        svc.indicate(Indication::MmConnectionActive { key });
        self.send_next_pending(rrc, svc);
        self.check_bookkeeping();
    }

    fn handle_cm_service_reject(&mut self, cause: RejectCause, rrc: &mut Rrc, svc: &mut UeServices) {
        if self.in_flight.is_none() {
            warn!("CM SERVICE REJECT without a pending request");
            return;
        }
        self.t3230.cancel(&mut svc.timers);
        warn!("CM service rejected: {:?}", cause);
        svc.stats.mm.cm_service_rejects += 1;
        self.fail_requests(MmConnFailure::Rejected(cause), svc);

        if matches!(cause, RejectCause::ImplicitlyDetached | RejectCause::ImsiUnknownInVlr) {
            self.status = UpdateStatus::NotUpdated;
            if self.active.is_empty() {
                self.set_state(MmState::WaitForNetworkCommand);
                self.start_location_update(LocationUpdateType::Normal, rrc, svc);
                return;
            }
            self.lu_type = LocationUpdateType::Normal;
            self.lu_needed = true;
        }
        if self.active.is_empty() {
            self.set_state(MmState::WaitForNetworkCommand);
            self.t3240.arm(&mut svc.timers, self.t3240_interval, TimerEvent::Mm(MmTimer::T3240));
        } else {
            self.set_state(MmState::MmConnectionActive);
        }
    }

    /// Paging for the CS domain: answer with PAGING RESPONSE.
    pub fn on_paged(&mut self, cause: PagingCause, rrc: &mut Rrc, svc: &mut UeServices) {
        match self.state {
            MmState::Idle(MmIdleSubstate::NormalService) | MmState::WaitForNetworkCommand => {}
            other => {
                debug!("CS paging ignored in {}", other);
                return;
            }
        }
        info!("Answering CS paging");
        self.t3240.cancel(&mut svc.timers);
        self.set_state(MmState::WaitForNetworkCommand);
        self.send(
            MmMessage::PagingResponse { tmsi: self.tmsi },
            EstablishmentCause::for_paging(cause),
            rrc,
            svc,
        );
        self.t3240.arm(&mut svc.timers, self.t3240_interval, TimerEvent::Mm(MmTimer::T3240));
    }

    // ========================================================================
    // Lower layer events
    // ========================================================================

    /// The CS signalling connection failed to come up or went away.
    pub fn on_signalling_lost(&mut self, rrc: &mut Rrc, svc: &mut UeServices) {
        match self.state {
            MmState::Null | MmState::Idle(_) => {}
            MmState::LocationUpdatingInitiated => {
                warn!("Location updating aborted by lower layer");
                self.location_update_failed(rrc, svc);
                self.enter_idle(rrc, svc);
            }
            _ => {
                debug!("CS signalling connection lost in {}", self.state);
                self.t3230.cancel(&mut svc.timers);
                self.t3240.cancel(&mut svc.timers);
                self.fail_requests(MmConnFailure::LowerLayer, svc);
                self.active.clear();
                self.enter_idle(rrc, svc);
            }
        }
    }

    /// Downlink MM message.
    pub fn handle_message(&mut self, msg: MmMessage, rrc: &mut Rrc, svc: &mut UeServices) {
        match msg {
            MmMessage::LocationUpdatingAccept { area, tmsi, t3212_deci_hours }
                if self.state == MmState::LocationUpdatingInitiated =>
            {
                self.handle_lu_accept(area, tmsi, t3212_deci_hours, rrc, svc)
            }
            MmMessage::LocationUpdatingReject { cause } if self.state == MmState::LocationUpdatingInitiated => {
                self.handle_lu_reject(cause, svc)
            }
            MmMessage::CmServiceAccept => self.handle_cm_service_accept(rrc, svc),
            MmMessage::CmServiceReject { cause } => self.handle_cm_service_reject(cause, rrc, svc),
            MmMessage::Abort { cause } => {
                warn!("MM connection aborted by network: {:?}", cause);
                self.t3230.cancel(&mut svc.timers);
                self.t3240.cancel(&mut svc.timers);
                self.fail_requests(MmConnFailure::Rejected(cause), svc);
                self.active.clear();
                self.enter_idle(rrc, svc);
                rrc.release_signalling(CnDomain::Cs, svc);
            }
            MmMessage::MmInformation => debug!("MM INFORMATION received"),
            MmMessage::MmStatus { cause } => warn!("MM STATUS received: {:?}", cause),
            other => warn!("Unexpected {} in {}", other.name(), self.state),
        }
    }

    pub fn on_timer(&mut self, handle: TimerHandle, timer: MmTimer, rrc: &mut Rrc, svc: &mut UeServices) {
        match timer {
            MmTimer::T3210 => {
                if self.t3210.take_if(handle) {
                    warn!("T3210 expired");
                    self.location_update_failed(rrc, svc);
                }
            }
            MmTimer::T3211 => {
                if self.t3211.take_if(handle) && self.state.is_idle() {
                    self.start_location_update(self.lu_type, rrc, svc);
                }
            }
            MmTimer::T3212 => {
                if self.t3212.take_if(handle) {
                    let update_type = if self.status == UpdateStatus::Updated {
                        LocationUpdateType::Periodic
                    } else {
                        LocationUpdateType::Normal
                    };
                    self.start_location_update(update_type, rrc, svc);
                }
            }
            MmTimer::T3230 => {
                if self.t3230.take_if(handle) {
                    warn!("T3230 expired");
                    self.fail_requests(MmConnFailure::Timeout, svc);
                    if self.active.is_empty() {
                        rrc.release_signalling(CnDomain::Cs, svc);
                        self.enter_idle(rrc, svc);
                    } else {
                        self.set_state(MmState::MmConnectionActive);
                    }
                }
            }
            MmTimer::T3240 => {
                if self.t3240.take_if(handle) {
                    debug!("T3240 expired, releasing CS signalling");
                    rrc.release_signalling(CnDomain::Cs, svc);
                    self.enter_idle(rrc, svc);
                }
            }
        }
    }
}
