//! UE Layer-3 context
//!
//! [`UeLayer3`] owns one state block per sublayer (RRC, MM, GMM, the flow
//! registry with the CC and SM records) plus the shared [`UeServices`], and
//! is the only entry point of the stack. Every external event runs to
//! completion: the handler for the event is called, then the queue of
//! internal indications is drained, each indication being routed to the
//! sublayer that consumes it. No sublayer calls into one above it.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};
use umtsim_common::{CellId, CnDomain, FlowClassifier, QosDescriptor, SimTime, UeConfig};
use umtsim_l3::{CcMessage, NasPdu, ProtocolDiscriminator, SmCause, SmMessage};

use crate::app::{AppId, AppIndication, CallParams, CallRejectCause, PeerId};
use crate::flow::{FlowId, FlowProto, FlowRegistry};
use crate::lower::{LowerLayerCommand, MetricKind, RbId, FIRST_USER_RB, LAST_USER_RB};
use crate::nas::{cc, sm, CcState, FlowOutcome, Gmm, Mm, SmState};
use crate::rrc::Rrc;
use crate::services::{Indication, UeServices};
use crate::stats::UeStats;
use crate::timer::{TimerEvent, TimerHandle, TimerSlot};

/// Layer-3 control plane of one UE.
#[derive(Debug)]
pub struct UeLayer3 {
    config: UeConfig,
    svc: UeServices,
    rrc: Rrc,
    mm: Mm,
    gmm: Gmm,
    flows: FlowRegistry,
    sweep: TimerSlot,
    powered: bool,
}

impl UeLayer3 {
    pub fn new(config: UeConfig) -> Self {
        Self {
            svc: UeServices::new(),
            rrc: Rrc::new(&config),
            mm: Mm::new(&config),
            gmm: Gmm::new(&config),
            flows: FlowRegistry::new(&config.flows),
            sweep: TimerSlot::new(),
            powered: false,
            config,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &UeConfig {
        &self.config
    }

    pub fn now(&self) -> SimTime {
        self.svc.now()
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn rrc(&self) -> &Rrc {
        &self.rrc
    }

    pub fn mm(&self) -> &Mm {
        &self.mm
    }

    pub fn gmm(&self) -> &Gmm {
        &self.gmm
    }

    pub fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    pub fn stats(&self) -> &UeStats {
        &self.svc.stats
    }

    /// Earliest armed timer, if any.
    pub fn next_deadline(&mut self) -> Option<SimTime> {
        self.svc.timers.next_deadline()
    }

    /// Commands issued to the radio layers since the last call.
    pub fn take_lower_commands(&mut self) -> Vec<LowerLayerCommand> {
        self.svc.take_lower_commands()
    }

    /// Notifications for the application since the last call.
    pub fn take_app_indications(&mut self) -> Vec<AppIndication> {
        self.svc.take_app_indications()
    }

    // ========================================================================
    // Power and time
    // ========================================================================

    pub fn power_on(&mut self) {
        if self.powered {
            return;
        }
        info!("UE {} power on", self.config.imsi);
        self.powered = true;
        self.mm.power_on();
        self.gmm.power_on();
        self.rrc.power_on(&mut self.svc);
        self.arm_sweep();
        self.drain();
    }

    /// Detaches from both domains, drops every flow and switches the radio
    /// off.
    pub fn power_off(&mut self) {
        if !self.powered {
            return;
        }
        info!("UE {} power off", self.config.imsi);
        for id in self.flows.iter().map(|f| f.id).collect::<Vec<_>>() {
            let Some(flow) = self.flows.get_mut(id) else { continue };
            let outcome = match flow.proto {
                FlowProto::Cc(_) => cc::on_signalling_lost(flow),
                FlowProto::Sm(_) => FlowOutcome::Remove,
            };
            self.apply(id, outcome);
        }
        self.gmm.power_off(&mut self.rrc, &mut self.svc);
        self.mm.power_off(&mut self.rrc, &mut self.svc);
        self.rrc.power_off(&mut self.svc);
        self.sweep.cancel(&mut self.svc.timers);
        self.powered = false;
        self.drain();
    }

    /// Runs every timer due up to `now`, in deadline order, then moves the
    /// clock to `now`.
    pub fn advance_to(&mut self, now: SimTime) {
        while let Some(deadline) = self.svc.timers.next_deadline() {
            if deadline > now {
                break;
            }
            self.svc.timers.advance(deadline);
            while let Some((handle, event)) = self.svc.timers.pop_due() {
                self.on_timer(handle, event);
                self.drain();
            }
        }
        self.svc.timers.advance(now);
    }

    fn arm_sweep(&mut self) {
        let interval = Duration::from_millis(self.config.flows.sweep_interval_ms);
        self.sweep.arm(&mut self.svc.timers, interval, TimerEvent::FlowSweep);
    }

    // ========================================================================
    // Lower layer
    // ========================================================================

    /// PDU received on a radio bearer.
    pub fn receive_on_bearer(&mut self, rb: RbId, data: Bytes) {
        if !self.powered {
            return;
        }
        if (FIRST_USER_RB..=LAST_USER_RB).contains(&rb) {
            self.deliver_user_data(rb, data);
        } else {
            self.rrc.handle_bearer_data(rb, data, &mut self.svc);
        }
        self.drain();
    }

    fn deliver_user_data(&mut self, rb: RbId, data: Bytes) {
        let Some(flow) = self.flows.by_rb(rb).and_then(|id| self.flows.get_mut(id)) else {
            warn!("User data on unbound RB{}", rb);
            return;
        };
        match flow.app_id() {
            Some(app_id) => {
                flow.last_active = self.svc.now();
                self.svc.stats.packets(CnDomain::Cs).from_lower += 1;
                self.svc.push_app(AppIndication::CsPayload { app_id, data });
            }
            None => sm::deliver_payload(flow, data, &mut self.svc),
        }
    }

    pub fn measurement_indication(&mut self, cell: CellId, metric: MetricKind, value: f64) {
        if !self.powered {
            return;
        }
        self.rrc.handle_measurement(cell, metric, value, &mut self.svc);
        self.drain();
    }

    pub fn am_rlc_unrecoverable_error(&mut self, rb: RbId) {
        if !self.powered {
            return;
        }
        self.rrc.handle_am_rlc_error(rb, &mut self.svc);
        self.drain();
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Uplink packet of a PS flow identified by `classifier`.
    pub fn submit_ps_payload(&mut self, classifier: FlowClassifier, data: Bytes, qos: Option<QosDescriptor>) {
        if !self.powered {
            self.svc.stats.ps_packets.from_upper += 1;
            self.svc.stats.ps_packets.dropped += 1;
            return;
        }
        let t3380 = self.config.timers.t3380_ms.map(Duration::from_millis);
        sm::submit_payload(
            &mut self.flows,
            classifier,
            data,
            qos,
            t3380,
            &mut self.gmm,
            &mut self.rrc,
            &mut self.svc,
        );
        self.drain();
    }

    /// Uplink voice frame of the call of `app_id`.
    pub fn submit_cs_payload(&mut self, app_id: AppId, data: Bytes) {
        match self.flows.by_app(app_id).and_then(|id| self.flows.get_mut(id)) {
            Some(flow) => cc::submit_payload(flow, data, &mut self.svc),
            None => {
                self.svc.stats.cs_packets.from_upper += 1;
                self.svc.stats.cs_packets.dropped += 1;
            }
        }
    }

    /// Places a call to `peer`. The returned flow is created immediately;
    /// its fate is reported through [`AppIndication`]s.
    pub fn start_call(&mut self, peer: PeerId, app_id: AppId, params: CallParams) -> Result<FlowId, CallRejectCause> {
        if !self.powered {
            return Err(CallRejectCause::ServiceUnavailable);
        }
        let t303 = self.config.timers.t303_ms.map(Duration::from_millis);
        let result = cc::originate(
            &mut self.flows,
            app_id,
            peer,
            params,
            t303,
            &mut self.mm,
            &mut self.rrc,
            &mut self.svc,
        );
        self.drain();
        result
    }

    /// Hangs up the call of `app_id`.
    pub fn end_call(&mut self, app_id: AppId) {
        let Some(id) = self.flows.by_app(app_id) else {
            debug!("No call for app {}", app_id);
            return;
        };
        if let Some(flow) = self.flows.get_mut(id) {
            let outcome = cc::end_call(flow, &mut self.rrc, &mut self.svc);
            self.apply(id, outcome);
        }
        self.drain();
    }

    /// The application accepted the ringing call of `app_id`.
    pub fn call_answered(&mut self, app_id: AppId) {
        if let Some(flow) = self.flows.by_app(app_id).and_then(|id| self.flows.get_mut(id)) {
            cc::answer(flow, &mut self.rrc, &mut self.svc);
        }
        self.drain();
    }

    /// PS detach requested by the user.
    pub fn detach(&mut self) {
        if !self.powered {
            return;
        }
        self.gmm.detach(false, &mut self.rrc, &mut self.svc);
        self.drain();
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn on_timer(&mut self, handle: TimerHandle, event: TimerEvent) {
        debug!("Timer expired: {}", event);
        match event {
            TimerEvent::Rrc(timer) => self.rrc.on_timer(handle, timer, &mut self.svc),
            TimerEvent::Mm(timer) => self.mm.on_timer(handle, timer, &mut self.rrc, &mut self.svc),
            TimerEvent::Gmm(timer) => self.gmm.on_timer(handle, timer, &mut self.rrc, &mut self.svc),
            TimerEvent::Cc { flow: id, timer } => {
                if let Some(flow) = self.flows.get_mut(id) {
                    let outcome = cc::on_timer(flow, handle, timer, &mut self.rrc, &mut self.svc);
                    self.apply(id, outcome);
                }
            }
            TimerEvent::Sm { flow: id, timer } => {
                if let Some(flow) = self.flows.get_mut(id) {
                    let outcome = sm::on_timer(flow, handle, timer, &mut self.rrc, &mut self.svc);
                    self.apply(id, outcome);
                    self.release_unused_ps_signalling();
                }
            }
            TimerEvent::FlowSweep => {
                if self.sweep.take_if(handle) {
                    self.run_sweep();
                    self.arm_sweep();
                }
            }
        }
    }

    fn run_sweep(&mut self) {
        let result = self.flows.sweep(self.svc.now());
        for id in result.deactivate {
            if let Some(flow) = self.flows.get_mut(id) {
                debug!("Flow {} idle, deactivating", id);
                let outcome = sm::deactivate(flow, SmCause::RegularDeactivation, &mut self.gmm, &mut self.rrc, &mut self.svc);
                self.apply(id, outcome);
            }
        }
        for id in result.purge {
            debug!("Purging rejected flow {}", id);
            self.remove_flow(id);
        }
    }

    fn drain(&mut self) {
        while let Some(ind) = self.svc.next_indication() {
            self.dispatch(ind);
        }
    }

    fn dispatch(&mut self, ind: Indication) {
        match ind {
            Indication::CellCamped { cell, area, t3212, attach_allowed } => {
                debug!("Camped on cell {} in {}", cell, area);
                self.mm.on_cell_camped(area, t3212, &mut self.rrc, &mut self.svc);
                self.gmm.on_cell_camped(area, attach_allowed, &mut self.rrc, &mut self.svc);
            }
            Indication::NoCellAvailable => {
                self.mm.on_no_cell();
                self.gmm.on_no_cell();
            }
            Indication::RrcEstablished { domain } => debug!("Signalling connection for {} established", domain),
            Indication::RrcEstablishFailed { domain } | Indication::SignallingReleased { domain } => {
                self.on_signalling_lost(domain);
            }
            Indication::NasReceived { domain, data } => match NasPdu::decode(data) {
                Ok(pdu) => self.route_nas(domain, pdu),
                Err(e) => warn!("Undecodable NAS message from {}: {}", domain, e),
            },
            Indication::Paged { domain: CnDomain::Cs, cause } => self.mm.on_paged(cause, &mut self.rrc, &mut self.svc),
            Indication::Paged { domain: CnDomain::Ps, cause } => self.gmm.on_paged(cause, &mut self.rrc, &mut self.svc),
            Indication::RabEstablished { rab_id, rb, domain } => {
                let Some(id) = self.flows.by_rab(rab_id) else {
                    debug!("RAB {} ({}) on RB{} awaits its flow", rab_id, domain, rb);
                    return;
                };
                if let Some(flow) = self.flows.get_mut(id) {
                    match flow.proto {
                        FlowProto::Cc(_) => flow.bind_rab(rab_id, &self.rrc),
                        FlowProto::Sm(_) => sm::on_rab_established(flow, rab_id, &self.rrc, &mut self.svc),
                    }
                }
            }
            Indication::RabReleased { rab_id } => {
                let Some(id) = self.flows.by_rab(rab_id) else { return };
                if let Some(flow) = self.flows.get_mut(id) {
                    let outcome = match flow.proto {
                        FlowProto::Cc(_) => cc::on_rab_released(flow),
                        FlowProto::Sm(_) => {
                            sm::on_rab_released(flow);
                            FlowOutcome::Keep
                        }
                    };
                    self.apply(id, outcome);
                }
            }
            Indication::MmConnectionActive { key } => {
                if let Some(flow) = self.flows.by_key(key).and_then(|id| self.flows.get_mut(id)) {
                    cc::on_mm_connection_active(flow, &mut self.rrc, &mut self.svc);
                }
            }
            Indication::MmConnectionFailed { key, failure } => {
                let Some(id) = self.flows.by_key(key) else { return };
                if let Some(flow) = self.flows.get_mut(id) {
                    let outcome = cc::on_mm_connection_failed(flow, failure);
                    self.apply(id, outcome);
                }
            }
            Indication::CombinedAttachAccepted { area } => self.mm.on_combined_attach(area),
            Indication::PsSignallingReady => {
                for id in self.flows.ids_in(CnDomain::Ps) {
                    if let Some(flow) = self.flows.get_mut(id) {
                        sm::on_signalling_ready(flow, &mut self.rrc, &mut self.svc);
                    }
                }
                self.release_unused_ps_signalling();
            }
            Indication::PsSignallingFailed => {
                for id in self.flows.ids_in(CnDomain::Ps) {
                    if let Some(flow) = self.flows.get_mut(id) {
                        let outcome = sm::on_signalling_failed(flow, &mut self.svc);
                        self.apply(id, outcome);
                    }
                }
            }
            Indication::PsDetached => {
                for id in self.flows.ids_in(CnDomain::Ps) {
                    self.remove_flow(id);
                }
            }
        }
    }

    fn on_signalling_lost(&mut self, domain: CnDomain) {
        match domain {
            CnDomain::Cs => self.mm.on_signalling_lost(&mut self.rrc, &mut self.svc),
            CnDomain::Ps => self.gmm.on_signalling_lost(&mut self.rrc, &mut self.svc),
        }
        for id in self.flows.ids_in(domain) {
            let Some(flow) = self.flows.get_mut(id) else { continue };
            // MM reports the fate of calls still waiting for a connection
            let waiting = flow.cc().is_some_and(|call| call.state == CcState::MmConnectionPending);
            let outcome = match flow.proto {
                FlowProto::Cc(_) if waiting => FlowOutcome::Keep,
                FlowProto::Cc(_) => cc::on_signalling_lost(flow),
                FlowProto::Sm(_) => sm::on_signalling_lost(flow, &mut self.svc),
            };
            self.apply(id, outcome);
        }
    }

    fn route_nas(&mut self, domain: CnDomain, pdu: NasPdu) {
        self.svc.stats.count_received(pdu.pd());
        if pdu.domain() != domain {
            warn!("{} received in the {} domain", pdu.name(), domain);
        }
        match pdu {
            NasPdu::Mm(msg) => self.mm.handle_message(msg, &mut self.rrc, &mut self.svc),
            NasPdu::Gmm(msg) => self.gmm.handle_message(msg, &mut self.rrc, &mut self.svc),
            NasPdu::Cc { ti, msg } => match self.flows.by_ti(ProtocolDiscriminator::Cc, ti) {
                Some(id) => {
                    if let Some(flow) = self.flows.get_mut(id) {
                        let outcome = cc::handle_message(flow, msg, &mut self.rrc, &mut self.svc);
                        self.apply(id, outcome);
                    }
                }
                None => match msg {
                    CcMessage::Setup { peer, app_id, duration_ms } if !ti.flag => {
                        let admitted = cc::terminate(
                            &mut self.flows,
                            ti,
                            peer,
                            app_id,
                            duration_ms,
                            &mut self.mm,
                            &mut self.rrc,
                            &mut self.svc,
                        );
                        if let Some(id) = admitted {
                            debug!("SETUP with TI {} admitted as call {}", ti.value, id);
                        }
                    }
                    CcMessage::ReleaseComplete { .. } => {
                        debug!("RELEASE COMPLETE for unknown TI {}", ti.value);
                    }
                    other => warn!("CC {:?} for unknown TI {}", other, ti.value),
                },
            },
            NasPdu::Sm { ti, msg } => {
                match self.flows.by_ti(ProtocolDiscriminator::Sm, ti) {
                    Some(id) => {
                        if let Some(flow) = self.flows.get_mut(id) {
                            let outcome = sm::handle_message(flow, msg, &mut self.rrc, &mut self.svc);
                            self.apply(id, outcome);
                        }
                    }
                    None => match msg {
                        SmMessage::RequestPdpContextActivation { classifier, qos } => {
                            sm::on_network_request(
                                &mut self.flows,
                                ti,
                                classifier,
                                qos,
                                &mut self.gmm,
                                &mut self.rrc,
                                &mut self.svc,
                            );
                        }
                        SmMessage::DeactivatePdpContextAccept => {
                            debug!("DEACTIVATE PDP CONTEXT ACCEPT for unknown TI {}", ti.value);
                        }
                        other => warn!("SM {:?} for unknown TI {}", other, ti.value),
                    },
                }
                self.release_unused_ps_signalling();
            }
        }
    }

    // ========================================================================
    // Flow teardown
    // ========================================================================

    fn apply(&mut self, id: FlowId, outcome: FlowOutcome) {
        if outcome == FlowOutcome::Remove {
            self.remove_flow(id);
        }
    }

    /// Removes a flow and everything it holds below: radio bearer, MM
    /// connection, and for the last PS flow the PS signalling connection.
    fn remove_flow(&mut self, id: FlowId) {
        let Some(flow) = self.flows.release(id, &mut self.svc) else { return };
        if let Some(rab_id) = flow.rab_id {
            self.rrc.release_rab_local(rab_id, &mut self.svc);
        }
        match &flow.proto {
            FlowProto::Cc(call) => {
                info!("Call {} removed", id);
                self.mm.release_mm_connection(flow.mm_key(), &mut self.rrc, &mut self.svc);
                let ind = cc::terminal_indication(call, &mut self.svc);
                self.svc.push_app(ind);
            }
            FlowProto::Sm(_) => {
                info!("PDP context {} removed", id);
                self.release_unused_ps_signalling();
            }
        }
    }

    /// Releases the PS signalling connection once no PS flow has anything
    /// left to signal.
    fn release_unused_ps_signalling(&mut self) {
        let in_use = self
            .flows
            .iter()
            .filter_map(|f| f.sm())
            .any(|ctx| ctx.state != SmState::Rejected);
        if !in_use {
            self.gmm.release_signalling(&mut self.rrc, &mut self.svc);
        }
    }
}
