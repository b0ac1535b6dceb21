//! SM (Session Management)
//!
//! One [`SmContext`] per PDP context, stored in a PS flow. Requests to the
//! network wait for GMM to provide the PS signalling connection: the context
//! records what it needs to send and the UE context calls
//! [`on_signalling_ready`] once GMM reports the connection usable.
//!
//! Uplink payload submitted before the context is active is buffered in the
//! flow and flushed on the bearer as soon as one is bound.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};
use umtsim_common::{CnDomain, FlowClassifier, FlowDirection, QosDescriptor, SimTime};
use umtsim_l3::{EstablishmentCause, L3Message, NasPdu, SmCause, SmMessage, TransactionId};

use super::{FlowOutcome, Gmm};
use crate::app::AppIndication;
use crate::flow::{Flow, FlowId, FlowProto, FlowRegistry};
use crate::lower::LowerLayerCommand;
use crate::rrc::Rrc;
use crate::services::UeServices;
use crate::timer::{
    GuardedRetry, RetryDecision, SmTimer, TimerCore, TimerEvent, TimerHandle, DEFAULT_T3380_INTERVAL,
    DEFAULT_T3390_INTERVAL, MAX_T3380_RETRIES, MAX_T3390_RETRIES,
};

/// PDP context states (TS 24.008 6.1.2.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SmState {
    #[default]
    Inactive,
    ActivePending,
    Active,
    InactivePending,
    /// Activation refused; kept until purged so that new payload for the
    /// classifier is dropped instead of retrying forever
    Rejected,
}

impl fmt::Display for SmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SmState::Inactive => "PDP-INACTIVE",
            SmState::ActivePending => "PDP-ACTIVE-PENDING",
            SmState::Active => "PDP-ACTIVE",
            SmState::InactivePending => "PDP-INACTIVE-PENDING",
            SmState::Rejected => "PDP-REJECTED",
        };
        f.write_str(s)
    }
}

/// SM sub-record of a PS flow.
#[derive(Debug)]
pub struct SmContext {
    pub state: SmState,
    /// ACTIVATE PDP CONTEXT REQUEST waits for the signalling connection
    activation_due: bool,
    /// DEACTIVATE PDP CONTEXT REQUEST waits for the signalling connection
    deactivation_due: Option<SmCause>,
    /// Waiting for the network to re-establish the bearer of an active
    /// context
    bearer_wanted: bool,
    t3380: GuardedRetry,
    t3390: GuardedRetry,
    pub rejected_at: Option<SimTime>,
}

impl SmContext {
    pub fn new(flow: FlowId) -> Self {
        let event = |timer| TimerEvent::Sm { flow, timer };
        Self {
            state: SmState::Inactive,
            activation_due: false,
            deactivation_due: None,
            bearer_wanted: false,
            t3380: GuardedRetry::new(event(SmTimer::T3380), DEFAULT_T3380_INTERVAL, MAX_T3380_RETRIES),
            t3390: GuardedRetry::new(event(SmTimer::T3390), DEFAULT_T3390_INTERVAL, MAX_T3390_RETRIES),
            rejected_at: None,
        }
    }

    /// Overrides the activation guard interval.
    pub fn set_activation_guard(&mut self, interval: Duration) {
        self.t3380.set_interval(interval);
    }

    pub fn is_active(&self) -> bool {
        self.state == SmState::Active
    }

    pub fn cancel_timers(&mut self, timers: &mut TimerCore) {
        self.t3380.stop(timers);
        self.t3390.stop(timers);
    }
}

fn set_state(flow: &mut Flow, new: SmState) {
    let id = flow.id;
    let ctx = flow.sm_mut();
    if ctx.state != new {
        debug!("SM {} state: {} -> {}", id, ctx.state, new);
        ctx.state = new;
    }
}

fn send(flow: &Flow, msg: SmMessage, rrc: &mut Rrc, svc: &mut UeServices) {
    rrc.send_nas(NasPdu::Sm { ti: flow.ti_sent(), msg }, EstablishmentCause::OriginatingInteractive, svc);
}

fn activation_request(flow: &Flow) -> Option<SmMessage> {
    Some(SmMessage::ActivatePdpContextRequest {
        nsapi: flow.nsapi?,
        qos: flow.qos,
        classifier: flow.classifier?,
    })
}

fn buffer(flow: &mut Flow, data: Bytes, capacity: usize, svc: &mut UeServices) {
    if flow.buffer_push(data, capacity) {
        warn!("Flow {} buffer full, oldest packet dropped", flow.id);
        svc.stats.packets(CnDomain::Ps).dropped += 1;
    }
    svc.stats.packets(CnDomain::Ps).enqueued += 1;
}

/// Sends everything buffered on the flow's bearer, oldest first.
fn flush(flow: &mut Flow, svc: &mut UeServices) {
    let Some(rb) = flow.rb else { return };
    let queued = flow.take_buffer();
    if queued.is_empty() {
        return;
    }
    debug!("Flow {} flushing {} packets on RB{}", flow.id, queued.len(), rb);
    flow.last_active = svc.now();
    for data in queued {
        svc.stats.packets(CnDomain::Ps).to_lower += 1;
        svc.push_lower(LowerLayerCommand::SendOnBearer { rb, data });
    }
}

fn reject(flow: &mut Flow, svc: &mut UeServices) {
    let ctx = flow.sm_mut();
    ctx.cancel_timers(&mut svc.timers);
    ctx.activation_due = false;
    ctx.rejected_at = Some(svc.now());
    set_state(flow, SmState::Rejected);
    let dropped = flow.take_buffer().len() as u64;
    svc.stats.packets(CnDomain::Ps).dropped += dropped;
    svc.stats.sm.activations_rejected += 1;
    if let Some(classifier) = flow.classifier {
        svc.push_app(AppIndication::SessionRejected { classifier });
    }
}

fn start_activation(flow: &mut Flow, gmm: &mut Gmm, rrc: &mut Rrc, svc: &mut UeServices) {
    let ctx = flow.sm_mut();
    ctx.activation_due = true;
    ctx.rejected_at = None;
    set_state(flow, SmState::ActivePending);
    svc.stats.sm.activations_requested += 1;
    gmm.request_ps_signalling(rrc, svc);
}

// ============================================================================
// Upper layer
// ============================================================================

/// Uplink packet for `classifier`. Creates and activates a context for an
/// unknown classifier.
#[allow(clippy::too_many_arguments)]
pub fn submit_payload(
    flows: &mut FlowRegistry,
    classifier: FlowClassifier,
    data: Bytes,
    qos: Option<QosDescriptor>,
    t3380: Option<Duration>,
    gmm: &mut Gmm,
    rrc: &mut Rrc,
    svc: &mut UeServices,
) {
    svc.stats.packets(CnDomain::Ps).from_upper += 1;
    let capacity = flows.buffer_capacity();

    if let Some(flow) = flows.by_classifier(&classifier).and_then(|id| flows.get_mut(id)) {
        match (flow.sm_mut().state, flow.rb) {
            (SmState::Active, Some(rb)) => {
                flow.last_active = svc.now();
                svc.stats.packets(CnDomain::Ps).to_lower += 1;
                svc.push_lower(LowerLayerCommand::SendOnBearer { rb, data });
            }
            (SmState::Active, None) => {
                buffer(flow, data, capacity, svc);
                let id = flow.id;
                let ctx = flow.sm_mut();
                if !ctx.bearer_wanted {
                    debug!("Flow {} has no bearer, requesting PS signalling", id);
                    ctx.bearer_wanted = true;
                    gmm.request_ps_signalling(rrc, svc);
                }
            }
            (SmState::ActivePending | SmState::Inactive, _) => buffer(flow, data, capacity, svc),
            (SmState::InactivePending | SmState::Rejected, _) => {
                svc.stats.packets(CnDomain::Ps).dropped += 1;
            }
        }
        return;
    }

    let now = svc.now();
    let Some(id) = flows.allocate(FlowDirection::MobileOriginated, CnDomain::Ps, None, now, |id| {
        let mut ctx = SmContext::new(id);
        if let Some(interval) = t3380 {
            ctx.set_activation_guard(interval);
        }
        FlowProto::Sm(ctx)
    }) else {
        warn!("No identifiers left for a new PDP context");
        svc.stats.packets(CnDomain::Ps).dropped += 1;
        svc.push_app(AppIndication::SessionRejected { classifier });
        return;
    };
    let Some(flow) = flows.get_mut(id) else { return };
    flow.classifier = Some(classifier);
    flow.qos = qos.unwrap_or_default();
    info!("PDP context {} for {}", id, classifier);
    buffer(flow, data, capacity, svc);
    start_activation(flow, gmm, rrc, svc);
}

/// Downlink packet received on the flow's bearer.
pub fn deliver_payload(flow: &mut Flow, data: Bytes, svc: &mut UeServices) {
    svc.stats.packets(CnDomain::Ps).from_lower += 1;
    flow.last_active = svc.now();
    if let Some(classifier) = flow.classifier {
        svc.push_app(AppIndication::PsPayload { classifier, data });
    }
}

/// Starts deactivation of an active context. A rejected context is simply
/// forgotten.
pub fn deactivate(flow: &mut Flow, cause: SmCause, gmm: &mut Gmm, rrc: &mut Rrc, svc: &mut UeServices) -> FlowOutcome {
    match flow.sm_mut().state {
        SmState::Active => {
            info!("Deactivating PDP context {} ({:?})", flow.id, cause);
            flow.sm_mut().deactivation_due = Some(cause);
            set_state(flow, SmState::InactivePending);
            gmm.request_ps_signalling(rrc, svc);
            FlowOutcome::Keep
        }
        SmState::Rejected | SmState::Inactive => FlowOutcome::Remove,
        state => {
            debug!("Deactivation of {} ignored in {}", flow.id, state);
            FlowOutcome::Keep
        }
    }
}

// ============================================================================
// GMM and RRC events
// ============================================================================

/// The PS signalling connection is usable: send what is waiting.
pub fn on_signalling_ready(flow: &mut Flow, rrc: &mut Rrc, svc: &mut UeServices) {
    let ctx = flow.sm_mut();
    ctx.bearer_wanted = false;
    if std::mem::take(&mut ctx.activation_due) {
        match activation_request(flow) {
            Some(msg) => {
                send(flow, msg, rrc, svc);
                flow.sm_mut().t3380.start(&mut svc.timers);
            }
            None => warn!("Flow {} lacks NSAPI or classifier", flow.id),
        }
    }
    if let Some(cause) = flow.sm_mut().deactivation_due.take() {
        send(flow, SmMessage::DeactivatePdpContextRequest { cause }, rrc, svc);
        flow.sm_mut().t3390.start(&mut svc.timers);
    }
}

/// GMM could not provide the PS signalling connection.
pub fn on_signalling_failed(flow: &mut Flow, svc: &mut UeServices) -> FlowOutcome {
    let ctx = flow.sm_mut();
    ctx.bearer_wanted = false;
    let (activating, deactivating) = (ctx.activation_due, ctx.deactivation_due.is_some());
    if activating {
        reject(flow, svc);
    } else if deactivating {
        return FlowOutcome::Remove;
    }
    FlowOutcome::Keep
}

/// The PS signalling connection was released. Requests in progress are
/// abandoned and active contexts are torn down with their bearer. A rejected
/// context stays until the sweep purges it.
pub fn on_signalling_lost(flow: &mut Flow, svc: &mut UeServices) -> FlowOutcome {
    match flow.sm_mut().state {
        SmState::ActivePending => {
            reject(flow, svc);
            FlowOutcome::Keep
        }
        SmState::Active => {
            info!("PDP context {} lost with the signalling connection", flow.id);
            flow.sm_mut().bearer_wanted = false;
            set_state(flow, SmState::Inactive);
            svc.stats.sm.deactivations += 1;
            FlowOutcome::Remove
        }
        SmState::InactivePending | SmState::Inactive => FlowOutcome::Remove,
        SmState::Rejected => FlowOutcome::Keep,
    }
}

pub fn on_rab_established(flow: &mut Flow, rab_id: u8, rrc: &Rrc, svc: &mut UeServices) {
    flow.bind_rab(rab_id, rrc);
    if flow.sm_mut().is_active() {
        flow.sm_mut().bearer_wanted = false;
        flush(flow, svc);
    }
}

/// Keeps the RAB identity so that a re-established bearer finds the flow.
pub fn on_rab_released(flow: &mut Flow) {
    flow.rb = None;
}

// ============================================================================
// Downlink
// ============================================================================

pub fn handle_message(flow: &mut Flow, msg: SmMessage, rrc: &mut Rrc, svc: &mut UeServices) -> FlowOutcome {
    let state = flow.sm_mut().state;
    match (state, msg) {
        (SmState::ActivePending, SmMessage::ActivatePdpContextAccept { rab_id, qos }) => {
            flow.sm_mut().t3380.stop(&mut svc.timers);
            flow.qos = qos;
            flow.bind_rab(rab_id, rrc);
            set_state(flow, SmState::Active);
            info!("PDP context {} active on RAB {}", flow.id, rab_id);
            svc.stats.sm.activations_accepted += 1;
            flush(flow, svc);
        }
        (SmState::ActivePending, SmMessage::ActivatePdpContextReject { cause }) => {
            warn!("PDP context {} rejected: {:?}", flow.id, cause);
            reject(flow, svc);
        }
        (_, SmMessage::DeactivatePdpContextRequest { cause }) => {
            info!("PDP context {} deactivated by network ({:?})", flow.id, cause);
            send(flow, SmMessage::DeactivatePdpContextAccept, rrc, svc);
            svc.stats.sm.deactivations += 1;
            return FlowOutcome::Remove;
        }
        (SmState::InactivePending, SmMessage::DeactivatePdpContextAccept) => {
            flow.sm_mut().t3390.stop(&mut svc.timers);
            svc.stats.sm.deactivations += 1;
            return FlowOutcome::Remove;
        }
        (_, SmMessage::SmStatus { cause }) => warn!("SM STATUS for {}: {:?}", flow.id, cause),
        (_, other) => warn!("Unexpected {} for {} in {}", other.name(), flow.id, state),
    }
    FlowOutcome::Keep
}

/// REQUEST PDP CONTEXT ACTIVATION: activate a context for the classifier,
/// reusing the flow if one exists.
pub fn on_network_request(
    flows: &mut FlowRegistry,
    ti: TransactionId,
    classifier: FlowClassifier,
    qos: QosDescriptor,
    gmm: &mut Gmm,
    rrc: &mut Rrc,
    svc: &mut UeServices,
) {
    svc.stats.sm.network_requested += 1;
    if let Some(flow) = flows.by_classifier(&classifier).and_then(|id| flows.get_mut(id)) {
        match flow.sm_mut().state {
            SmState::Rejected | SmState::Inactive => {
                flow.qos = qos;
                start_activation(flow, gmm, rrc, svc);
            }
            state => debug!("Network request for {} ignored in {}", flow.id, state),
        }
        return;
    }

    let now = svc.now();
    let allocated = flows.allocate(FlowDirection::MobileOriginated, CnDomain::Ps, None, now, |id| {
        FlowProto::Sm(SmContext::new(id))
    });
    let Some(flow) = allocated.and_then(|id| flows.get_mut(id)) else {
        warn!("Network requested PDP context refused: no identifiers left");
        let msg = SmMessage::RequestPdpContextActivationReject { cause: SmCause::InsufficientResources };
        let pdu = NasPdu::Sm { ti: TransactionId::new(ti.value, true), msg };
        rrc.send_nas(pdu, EstablishmentCause::TerminatingInteractive, svc);
        return;
    };
    flow.classifier = Some(classifier);
    flow.qos = qos;
    info!("PDP context {} requested by network for {}", flow.id, classifier);
    start_activation(flow, gmm, rrc, svc);
}

pub fn on_timer(flow: &mut Flow, handle: TimerHandle, timer: SmTimer, rrc: &mut Rrc, svc: &mut UeServices) -> FlowOutcome {
    let id = flow.id;
    match timer {
        SmTimer::T3380 => match flow.sm_mut().t3380.on_expiry(handle) {
            RetryDecision::Stale => {}
            RetryDecision::Retry => {
                debug!("T3380 expired for {}, resending ACTIVATE PDP CONTEXT REQUEST", id);
                if let Some(msg) = activation_request(flow) {
                    send(flow, msg, rrc, svc);
                }
                flow.sm_mut().t3380.retry(&mut svc.timers);
            }
            RetryDecision::Exhausted => {
                warn!("PDP context {}: activation not answered", id);
                reject(flow, svc);
            }
        },
        SmTimer::T3390 => match flow.sm_mut().t3390.on_expiry(handle) {
            RetryDecision::Stale => {}
            RetryDecision::Retry => {
                let msg = SmMessage::DeactivatePdpContextRequest { cause: SmCause::RegularDeactivation };
                send(flow, msg, rrc, svc);
                flow.sm_mut().t3390.retry(&mut svc.timers);
            }
            RetryDecision::Exhausted => {
                warn!("PDP context {}: deactivation not answered", id);
                return FlowOutcome::Remove;
            }
        },
    }
    FlowOutcome::Keep
}
