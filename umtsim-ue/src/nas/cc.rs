//! CC (Call Control)
//!
//! One [`CcCall`] per call, stored in its flow. The handlers here operate on
//! a single flow and report through [`FlowOutcome`] whether the call is
//! over; the UE context then removes the flow, which releases the MM
//! connection and the radio bearer and tells the application how the call
//! ended ([`terminal_indication`]).
//!
//! # Mobile originating
//!
//! ```text
//! MM_CONNECTION_PENDING --MM connection--> CALL_INITIATED (SETUP, T303)
//!   --CALL PROCEEDING--> MO_CALL_PROCEEDING (T310)
//!   --ALERTING--> CALL_DELIVERED
//!   --CONNECT--> ACTIVE (CONNECT ACKNOWLEDGE)
//! ```
//!
//! # Mobile terminating
//!
//! ```text
//! SETUP --> CALL_PRESENT (CALL CONFIRMED) --> MT_CALL_CONFIRMED (ALERTING)
//!   --> CALL_RECEIVED --answer--> CONNECT_REQUEST (CONNECT, T313)
//!   --CONNECT ACKNOWLEDGE--> ACTIVE
//! ```
//!
//! # Clearing
//!
//! Local clearing sends DISCONNECT (T305) and waits for RELEASE. A network
//! DISCONNECT is answered with RELEASE (T308, two transmissions). RELEASE
//! is answered with RELEASE COMPLETE; either ends the call.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};
use umtsim_common::{CnDomain, FlowDirection, QosDescriptor};
use umtsim_l3::{CcCause, CcMessage, EstablishmentCause, L3Message, NasPdu, TransactionId};

use super::{FlowOutcome, Mm, MmConnFailure};
use crate::app::{AppId, AppIndication, CallParams, CallRejectCause, PeerId};
use crate::flow::{Flow, FlowId, FlowProto, FlowRegistry};
use crate::lower::LowerLayerCommand;
use crate::rrc::Rrc;
use crate::services::UeServices;
use crate::timer::{
    CcTimer, GuardedRetry, RetryDecision, TimerCore, TimerEvent, TimerHandle, TimerSlot,
    DEFAULT_CC_T308_INTERVAL, DEFAULT_T303_INTERVAL, DEFAULT_T305_INTERVAL, DEFAULT_T310_INTERVAL,
    DEFAULT_T313_INTERVAL, MAX_CC_T308_RETRIES, MAX_T303_RETRIES,
};

/// Call states (TS 24.008 5.1.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CcState {
    #[default]
    Null,
    /// Waiting for the MM connection before SETUP can be sent
    MmConnectionPending,
    CallInitiated,
    MobileOriginatingCallProceeding,
    CallDelivered,
    CallPresent,
    CallReceived,
    ConnectRequest,
    MobileTerminatingCallConfirmed,
    Active,
    DisconnectRequest,
    DisconnectIndication,
    ReleaseRequest,
}

impl fmt::Display for CcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CcState::Null => "U0 NULL",
            CcState::MmConnectionPending => "U0.1 MM_CONNECTION_PENDING",
            CcState::CallInitiated => "U1 CALL_INITIATED",
            CcState::MobileOriginatingCallProceeding => "U3 MO_CALL_PROCEEDING",
            CcState::CallDelivered => "U4 CALL_DELIVERED",
            CcState::CallPresent => "U6 CALL_PRESENT",
            CcState::CallReceived => "U7 CALL_RECEIVED",
            CcState::ConnectRequest => "U8 CONNECT_REQUEST",
            CcState::MobileTerminatingCallConfirmed => "U9 MT_CALL_CONFIRMED",
            CcState::Active => "U10 ACTIVE",
            CcState::DisconnectRequest => "U11 DISCONNECT_REQUEST",
            CcState::DisconnectIndication => "U12 DISCONNECT_INDICATION",
            CcState::ReleaseRequest => "U19 RELEASE_REQUEST",
        };
        f.write_str(s)
    }
}

/// How a call ended, as reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEnd {
    Ended,
    Dropped,
    Rejected(CallRejectCause),
}

/// CC sub-record of a call flow.
#[derive(Debug)]
pub struct CcCall {
    pub state: CcState,
    pub app_id: AppId,
    pub peer: PeerId,
    pub duration: Option<Duration>,
    t303: GuardedRetry,
    t305: TimerSlot,
    t308: GuardedRetry,
    t310: TimerSlot,
    t313: TimerSlot,
    /// Outcome decided so far; reported when the flow is removed
    pub end: Option<CallEnd>,
}

impl CcCall {
    pub fn new(flow: FlowId, app_id: AppId, peer: PeerId, duration: Option<Duration>) -> Self {
        let event = |timer| TimerEvent::Cc { flow, timer };
        Self {
            state: CcState::Null,
            app_id,
            peer,
            duration,
            t303: GuardedRetry::new(event(CcTimer::T303), DEFAULT_T303_INTERVAL, MAX_T303_RETRIES),
            t305: TimerSlot::new(),
            t308: GuardedRetry::new(event(CcTimer::T308), DEFAULT_CC_T308_INTERVAL, MAX_CC_T308_RETRIES),
            t310: TimerSlot::new(),
            t313: TimerSlot::new(),
            end: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == CcState::Active
    }

    pub fn cancel_timers(&mut self, timers: &mut TimerCore) {
        self.t303.stop(timers);
        self.t305.cancel(timers);
        self.t308.stop(timers);
        self.t310.cancel(timers);
        self.t313.cancel(timers);
    }

    fn set_end(&mut self, end: CallEnd) {
        self.end.get_or_insert(end);
    }
}

fn set_state(flow: &mut Flow, new: CcState) {
    let id = flow.id;
    let call = flow.cc_mut();
    if call.state != new {
        debug!("CC {} state: {} -> {}", id, call.state, new);
        call.state = new;
    }
}

fn send(flow: &Flow, msg: CcMessage, rrc: &mut Rrc, svc: &mut UeServices) {
    let cause = match flow.direction {
        FlowDirection::MobileOriginated => EstablishmentCause::OriginatingConversational,
        FlowDirection::NetworkOriginated => EstablishmentCause::TerminatingConversational,
    };
    rrc.send_nas(NasPdu::Cc { ti: flow.ti_sent(), msg }, cause, svc);
}

fn setup_message(call: &CcCall) -> CcMessage {
    CcMessage::Setup {
        peer: call.peer,
        app_id: call.app_id,
        duration_ms: call.duration.map_or(0, |d| d.as_millis().min(u128::from(u32::MAX)) as u32),
    }
}

// ============================================================================
// Call establishment
// ============================================================================

/// Creates a mobile-originated call and asks MM for a connection.
#[allow(clippy::too_many_arguments)]
pub fn originate(
    flows: &mut FlowRegistry,
    app_id: AppId,
    peer: PeerId,
    params: CallParams,
    t303: Option<Duration>,
    mm: &mut Mm,
    rrc: &mut Rrc,
    svc: &mut UeServices,
) -> Result<FlowId, CallRejectCause> {
    let now = svc.now();
    let id = flows
        .allocate(FlowDirection::MobileOriginated, CnDomain::Cs, None, now, |id| {
            let mut call = CcCall::new(id, app_id, peer, params.duration);
            if let Some(interval) = t303 {
                call.t303.set_interval(interval);
            }
            FlowProto::Cc(call)
        })
        .ok_or(CallRejectCause::NoResources)?;
    let Some(flow) = flows.get_mut(id) else {
        return Err(CallRejectCause::NoResources);
    };
    flow.qos = QosDescriptor::VOICE;
    info!("Call {} to peer {} (app {})", id, peer, app_id);
    svc.stats.cc.calls_originated += 1;
    set_state(flow, CcState::MmConnectionPending);
    mm.request_mm_connection(flow.mm_key(), rrc, svc);
    Ok(id)
}

/// The MM connection of a pending call is up: send SETUP.
pub fn on_mm_connection_active(flow: &mut Flow, rrc: &mut Rrc, svc: &mut UeServices) {
    if flow.cc_mut().state != CcState::MmConnectionPending {
        return;
    }
    let msg = setup_message(flow.cc_mut());
    send(flow, msg, rrc, svc);
    flow.cc_mut().t303.start(&mut svc.timers);
    set_state(flow, CcState::CallInitiated);
}

/// MM could not provide a connection.
pub fn on_mm_connection_failed(flow: &mut Flow, failure: MmConnFailure) -> FlowOutcome {
    let cause = match failure {
        MmConnFailure::Rejected(_) => CallRejectCause::NetworkRejected,
        MmConnFailure::Timeout | MmConnFailure::LowerLayer => CallRejectCause::UserUnreachable,
        MmConnFailure::NotRegistered => CallRejectCause::ServiceUnavailable,
    };
    warn!("Call {} failed: MM connection {}", flow.id, failure);
    flow.cc_mut().set_end(CallEnd::Rejected(cause));
    FlowOutcome::Remove
}

/// Network SETUP for a new transaction.
#[allow(clippy::too_many_arguments)]
pub fn terminate(
    flows: &mut FlowRegistry,
    ti: TransactionId,
    peer: PeerId,
    app_id: AppId,
    duration_ms: u32,
    mm: &mut Mm,
    rrc: &mut Rrc,
    svc: &mut UeServices,
) -> Option<FlowId> {
    let duration = (duration_ms > 0).then(|| Duration::from_millis(u64::from(duration_ms)));
    let now = svc.now();
    let Some(id) = flows.allocate(FlowDirection::NetworkOriginated, CnDomain::Cs, Some(ti.value), now, |id| {
        FlowProto::Cc(CcCall::new(id, app_id, peer, duration))
    }) else {
        warn!("Incoming call with TI {} refused: busy", ti.value);
        let msg = CcMessage::ReleaseComplete { cause: CcCause::UserBusy };
        let pdu = NasPdu::Cc { ti: TransactionId::new(ti.value, true), msg };
        rrc.send_nas(pdu, EstablishmentCause::TerminatingConversational, svc);
        return None;
    };
    let flow = flows.get_mut(id)?;
    flow.qos = QosDescriptor::VOICE;
    info!("Incoming call {} from peer {} (app {})", id, peer, app_id);
    svc.stats.cc.calls_terminated += 1;
    mm.on_mt_connection(flow.mm_key(), svc);

    set_state(flow, CcState::CallPresent);
    send(flow, CcMessage::CallConfirmed, rrc, svc);
    set_state(flow, CcState::MobileTerminatingCallConfirmed);
    svc.push_app(AppIndication::CallArrived { app_id, peer });
    send(flow, CcMessage::Alerting, rrc, svc);
    set_state(flow, CcState::CallReceived);
    Some(id)
}

/// The application answered an incoming call.
pub fn answer(flow: &mut Flow, rrc: &mut Rrc, svc: &mut UeServices) {
    let state = flow.cc_mut().state;
    if state != CcState::CallReceived {
        warn!("Answer for call {} in {}", flow.id, state);
        return;
    }
    send(flow, CcMessage::Connect { rab_id: None }, rrc, svc);
    let event = TimerEvent::Cc { flow: flow.id, timer: CcTimer::T313 };
    flow.cc_mut().t313.arm(&mut svc.timers, DEFAULT_T313_INTERVAL, event);
    set_state(flow, CcState::ConnectRequest);
}

fn bind(flow: &mut Flow, rab_id: Option<u8>, rrc: &Rrc) {
    if let Some(rab) = rab_id {
        flow.bind_rab(rab, rrc);
    }
}

// ============================================================================
// Call clearing
// ============================================================================

/// Sends DISCONNECT and waits for the network's RELEASE.
fn start_clearing(flow: &mut Flow, cause: CcCause, end: CallEnd, rrc: &mut Rrc, svc: &mut UeServices) {
    let id = flow.id;
    let call = flow.cc_mut();
    call.cancel_timers(&mut svc.timers);
    call.set_end(end);
    call.t305.arm(&mut svc.timers, DEFAULT_T305_INTERVAL, TimerEvent::Cc { flow: id, timer: CcTimer::T305 });
    send(flow, CcMessage::Disconnect { cause }, rrc, svc);
    set_state(flow, CcState::DisconnectRequest);
}

fn send_release(flow: &mut Flow, cause: CcCause, rrc: &mut Rrc, svc: &mut UeServices) {
    send(flow, CcMessage::Release { cause }, rrc, svc);
    let call = flow.cc_mut();
    call.t305.cancel(&mut svc.timers);
    call.t308.start(&mut svc.timers);
    set_state(flow, CcState::ReleaseRequest);
}

/// Outcome of a call cleared by the network.
fn network_end(flow: &Flow, cause: CcCause) -> CallEnd {
    match flow.cc().map(|c| c.state) {
        Some(CcState::Active) => CallEnd::Ended,
        _ if flow.direction == FlowDirection::NetworkOriginated => CallEnd::Ended,
        _ if cause == CcCause::UserBusy => CallEnd::Rejected(CallRejectCause::UserBusy),
        _ if cause == CcCause::NormalCallClearing => CallEnd::Ended,
        _ => CallEnd::Rejected(CallRejectCause::NetworkRejected),
    }
}

/// Local hang-up.
pub fn end_call(flow: &mut Flow, rrc: &mut Rrc, svc: &mut UeServices) -> FlowOutcome {
    match flow.cc_mut().state {
        CcState::MmConnectionPending | CcState::Null => {
            flow.cc_mut().set_end(CallEnd::Ended);
            FlowOutcome::Remove
        }
        CcState::DisconnectRequest | CcState::DisconnectIndication | CcState::ReleaseRequest => FlowOutcome::Keep,
        _ => {
            info!("Clearing call {}", flow.id);
            start_clearing(flow, CcCause::NormalCallClearing, CallEnd::Ended, rrc, svc);
            FlowOutcome::Keep
        }
    }
}

/// The radio bearer of the call went away.
pub fn on_rab_released(flow: &mut Flow) -> FlowOutcome {
    flow.rab_id = None;
    flow.rb = None;
    let call = flow.cc_mut();
    if call.state == CcState::Active {
        warn!("Bearer of active call lost");
        call.set_end(CallEnd::Dropped);
        FlowOutcome::Remove
    } else {
        FlowOutcome::Keep
    }
}

/// The CS signalling connection went away under the call.
pub fn on_signalling_lost(flow: &mut Flow) -> FlowOutcome {
    let call = flow.cc_mut();
    let end = if call.state == CcState::Active {
        CallEnd::Dropped
    } else {
        CallEnd::Rejected(CallRejectCause::UserUnreachable)
    };
    call.set_end(end);
    FlowOutcome::Remove
}

// ============================================================================
// Downlink
// ============================================================================

/// Downlink CC message for an existing call.
pub fn handle_message(flow: &mut Flow, msg: CcMessage, rrc: &mut Rrc, svc: &mut UeServices) -> FlowOutcome {
    let state = flow.cc_mut().state;
    match (state, msg) {
        (CcState::CallInitiated, CcMessage::CallProceeding) => {
            let id = flow.id;
            let call = flow.cc_mut();
            call.t303.stop(&mut svc.timers);
            call.t310.arm(&mut svc.timers, DEFAULT_T310_INTERVAL, TimerEvent::Cc { flow: id, timer: CcTimer::T310 });
            set_state(flow, CcState::MobileOriginatingCallProceeding);
        }
        (CcState::CallInitiated | CcState::MobileOriginatingCallProceeding, CcMessage::Alerting) => {
            let call = flow.cc_mut();
            call.t303.stop(&mut svc.timers);
            call.t310.cancel(&mut svc.timers);
            set_state(flow, CcState::CallDelivered);
        }
        (
            CcState::CallInitiated | CcState::MobileOriginatingCallProceeding | CcState::CallDelivered,
            CcMessage::Connect { rab_id },
        ) => {
            flow.cc_mut().cancel_timers(&mut svc.timers);
            bind(flow, rab_id, rrc);
            send(flow, CcMessage::ConnectAcknowledge { rab_id: None }, rrc, svc);
            set_state(flow, CcState::Active);
            info!("Call {} answered", flow.id);
            svc.stats.cc.calls_answered += 1;
            let call = flow.cc_mut();
            svc.push_app(AppIndication::CallAnswered { app_id: call.app_id, peer: call.peer });
        }
        (CcState::ConnectRequest, CcMessage::ConnectAcknowledge { rab_id }) => {
            flow.cc_mut().t313.cancel(&mut svc.timers);
            bind(flow, rab_id, rrc);
            set_state(flow, CcState::Active);
            info!("Call {} connected", flow.id);
            svc.stats.cc.calls_answered += 1;
        }
        (CcState::ReleaseRequest | CcState::DisconnectIndication | CcState::Null, CcMessage::Disconnect { .. }) => {
            debug!("DISCONNECT ignored in {}", state);
        }
        (CcState::DisconnectRequest, CcMessage::Disconnect { .. }) => {
            // clearing collision: answer as if RELEASE had been sent first
            send_release(flow, CcCause::NormalCallClearing, rrc, svc);
        }
        (_, CcMessage::Disconnect { cause }) => {
            info!("Call {} disconnected by network ({:?})", flow.id, cause);
            let end = network_end(flow, cause);
            let call = flow.cc_mut();
            call.cancel_timers(&mut svc.timers);
            call.set_end(end);
            set_state(flow, CcState::DisconnectIndication);
            send_release(flow, CcCause::NormalCallClearing, rrc, svc);
        }
        (CcState::ReleaseRequest, CcMessage::Release { .. }) => {
            // release collision
            return FlowOutcome::Remove;
        }
        (_, CcMessage::Release { cause }) => {
            let end = network_end(flow, cause);
            flow.cc_mut().set_end(end);
            send(flow, CcMessage::ReleaseComplete { cause: CcCause::NormalCallClearing }, rrc, svc);
            return FlowOutcome::Remove;
        }
        (_, CcMessage::ReleaseComplete { cause }) => {
            let end = network_end(flow, cause);
            flow.cc_mut().set_end(end);
            return FlowOutcome::Remove;
        }
        (_, CcMessage::Progress | CcMessage::Notify) => debug!("CC {} in {}", flow.id, state),
        (_, CcMessage::Status { cause }) => warn!("CC STATUS for call {}: {:?}", flow.id, cause),
        (_, other) => warn!("Unexpected {} for call {} in {}", other.name(), flow.id, state),
    }
    FlowOutcome::Keep
}

pub fn on_timer(
    flow: &mut Flow,
    handle: TimerHandle,
    timer: CcTimer,
    rrc: &mut Rrc,
    svc: &mut UeServices,
) -> FlowOutcome {
    let id = flow.id;
    match timer {
        CcTimer::T303 => match flow.cc_mut().t303.on_expiry(handle) {
            RetryDecision::Stale => {}
            RetryDecision::Retry => {
                debug!("T303 expired for call {}, resending SETUP", id);
                let msg = setup_message(flow.cc_mut());
                send(flow, msg, rrc, svc);
                flow.cc_mut().t303.retry(&mut svc.timers);
            }
            RetryDecision::Exhausted => {
                warn!("Call {}: no answer to SETUP", id);
                flow.cc_mut().set_end(CallEnd::Rejected(CallRejectCause::UserUnreachable));
                return FlowOutcome::Remove;
            }
        },
        CcTimer::T310 => {
            if flow.cc_mut().t310.take_if(handle) {
                warn!("T310 expired for call {}", id);
                let end = CallEnd::Rejected(CallRejectCause::UserUnreachable);
                start_clearing(flow, CcCause::RecoveryOnTimerExpiry, end, rrc, svc);
            }
        }
        CcTimer::T313 => {
            if flow.cc_mut().t313.take_if(handle) {
                warn!("T313 expired for call {}", id);
                start_clearing(flow, CcCause::RecoveryOnTimerExpiry, CallEnd::Dropped, rrc, svc);
            }
        }
        CcTimer::T305 => {
            if flow.cc_mut().t305.take_if(handle) {
                send_release(flow, CcCause::RecoveryOnTimerExpiry, rrc, svc);
            }
        }
        CcTimer::T308 => match flow.cc_mut().t308.on_expiry(handle) {
            RetryDecision::Stale => {}
            RetryDecision::Retry => {
                send(flow, CcMessage::Release { cause: CcCause::RecoveryOnTimerExpiry }, rrc, svc);
                flow.cc_mut().t308.retry(&mut svc.timers);
            }
            RetryDecision::Exhausted => {
                warn!("Call {}: RELEASE not answered", id);
                return FlowOutcome::Remove;
            }
        },
    }
    FlowOutcome::Keep
}

// ============================================================================
// Payload and teardown
// ============================================================================

/// Uplink voice frame.
pub fn submit_payload(flow: &mut Flow, data: Bytes, svc: &mut UeServices) {
    svc.stats.packets(CnDomain::Cs).from_upper += 1;
    match (flow.cc().map(CcCall::is_active), flow.rb) {
        (Some(true), Some(rb)) => {
            svc.stats.packets(CnDomain::Cs).to_lower += 1;
            flow.last_active = svc.now();
            svc.push_lower(LowerLayerCommand::SendOnBearer { rb, data });
        }
        _ => svc.stats.packets(CnDomain::Cs).dropped += 1,
    }
}

/// Application notification for a call that was removed, with its counter.
pub fn terminal_indication(call: &CcCall, svc: &mut UeServices) -> AppIndication {
    let (app_id, peer) = (call.app_id, call.peer);
    match call.end.unwrap_or(CallEnd::Ended) {
        CallEnd::Ended => {
            svc.stats.cc.calls_ended += 1;
            AppIndication::CallEnded { app_id, peer }
        }
        CallEnd::Dropped => {
            svc.stats.cc.calls_dropped += 1;
            AppIndication::CallDropped { app_id, peer }
        }
        CallEnd::Rejected(cause) => {
            svc.stats.cc.calls_rejected += 1;
            AppIndication::CallRejected { app_id, peer, cause }
        }
    }
}
