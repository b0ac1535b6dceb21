//! Circuit-switched call integration tests
//!
//! Mobile originating and terminating calls, normal clearing, busy and
//! unanswered destinations, and calls lost with the connection.

use std::time::Duration;

use bytes::Bytes;
use integration_tests::{
    assert_bearer_accounting, configured_user_bearers, home_cell, init_test_logging, packet, udp_flow, CallBehaviour,
    MockNetwork, MockNetworkConfig, SimHarness, CS_RAB_BASE,
};
use umtsim_common::{SimTime, UeConfig};
use umtsim_l3::{CcMessage, MmMessage, NasPdu};
use umtsim_ue::{AppIndication, CallParams, CallRejectCause, CcState, MmState, SmState};

const APP: u32 = 1;
const PEER: u32 = 42;

fn harness_with(behaviour: CallBehaviour) -> SimHarness {
    let net = MockNetwork::with_config(MockNetworkConfig { call_behaviour: behaviour, ..Default::default() });
    let mut h = SimHarness::with_network(UeConfig::default(), net);
    h.add_cell(home_cell());
    h.exchange();
    h.take_indications();
    h
}

fn count_setups(h: &SimHarness) -> usize {
    h.net.count_nas(|p| matches!(p, NasPdu::Cc { msg: CcMessage::Setup { .. }, .. }))
}

/// Test an originating call the remote party answers
#[test]
fn test_originating_call_answered() {
    init_test_logging();

    let mut h = harness_with(CallBehaviour::Answer);
    let id = h.ue.start_call(PEER, APP, CallParams::default()).expect("call admitted");
    h.exchange();

    assert_eq!(h.take_indications(), vec![AppIndication::CallAnswered { app_id: APP, peer: PEER }]);
    let flow = h.ue.flows().get(id).expect("call present");
    assert_eq!(flow.cc().map(|c| c.state), Some(CcState::Active));
    assert_eq!(flow.rab_id, Some(CS_RAB_BASE));
    let rb = flow.rb.expect("traffic bearer bound");
    assert_eq!(h.ue.rrc().rb_for_rab(CS_RAB_BASE), Some(rb));
    assert_eq!(h.ue.mm().state(), MmState::MmConnectionActive);

    // voice frames use the traffic bearer
    h.ue.submit_cs_payload(APP, Bytes::from_static(b"frame"));
    h.exchange();
    assert_eq!(h.net.user_data(), vec![(rb, Bytes::from_static(b"frame"))]);

    let stats = h.ue.stats();
    assert_eq!(stats.cc.calls_originated, 1);
    assert_eq!(stats.cc.calls_answered, 1);
    assert_eq!(stats.cs_packets.to_lower, 1);
    assert_bearer_accounting(&h.ue);
}

/// Test normal clearing from the UE side
#[test]
fn test_call_cleared_by_user() {
    init_test_logging();

    let mut h = harness_with(CallBehaviour::Answer);
    h.ue.start_call(PEER, APP, CallParams::default()).expect("call admitted");
    h.exchange();
    h.take_indications();

    h.ue.end_call(APP);
    h.exchange();

    assert_eq!(h.take_indications(), vec![AppIndication::CallEnded { app_id: APP, peer: PEER }]);
    assert!(h.ue.flows().is_empty());
    assert_eq!(h.ue.stats().cc.calls_ended, 1);
    assert!(configured_user_bearers(&h.ue).is_empty());
    // connection held for T3240, then released
    assert_eq!(h.ue.mm().state(), MmState::WaitForNetworkCommand);
    h.run_for(Duration::from_secs(11));
    assert!(h.ue.rrc().state().is_idle());
    assert_bearer_accounting(&h.ue);

    // voice frames after the call are dropped
    h.ue.submit_cs_payload(APP, Bytes::from_static(b"late"));
    assert_eq!(h.ue.stats().cs_packets.dropped, 1);
}

/// Test a network that never answers SETUP
#[test]
fn test_unanswered_setup() {
    init_test_logging();

    let mut h = harness_with(CallBehaviour::Silent);
    h.ue.start_call(PEER, APP, CallParams::default()).expect("call admitted");
    h.exchange();
    assert_eq!(count_setups(&h), 1);

    h.run_until(SimTime::from_secs(29));
    assert_eq!(count_setups(&h), 1);
    h.run_until(SimTime::from_secs(31));
    assert_eq!(count_setups(&h), 2);
    assert!(h.indications().is_empty());

    h.run_until(SimTime::from_secs(61));
    assert_eq!(
        h.take_indications(),
        vec![AppIndication::CallRejected { app_id: APP, peer: PEER, cause: CallRejectCause::UserUnreachable }]
    );
    assert!(h.ue.flows().is_empty());
    assert_eq!(h.ue.stats().cc.calls_rejected, 1);
}

/// Test a busy destination
#[test]
fn test_busy_destination() {
    init_test_logging();

    let mut h = harness_with(CallBehaviour::Busy);
    h.ue.start_call(PEER, APP, CallParams::default()).expect("call admitted");
    h.exchange();

    assert_eq!(
        h.take_indications(),
        vec![AppIndication::CallRejected { app_id: APP, peer: PEER, cause: CallRejectCause::UserBusy }]
    );
    assert!(h.ue.flows().is_empty());
    assert_eq!(h.net.count_nas(|p| matches!(p, NasPdu::Cc { msg: CcMessage::Release { .. }, .. })), 1);
}

/// Test a terminating call answered by the application
#[test]
fn test_terminating_call() {
    init_test_logging();

    let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());
    h.run_for(Duration::from_secs(15));
    assert!(h.ue.rrc().state().is_idle());
    h.take_indications();

    h.incoming_call(PEER, APP);
    assert_eq!(h.ue.stats().rrc.pagings, 1);
    assert_eq!(
        h.net.count_nas(|p| matches!(p, NasPdu::Mm(MmMessage::PagingResponse { .. }))),
        1
    );
    assert_eq!(h.take_indications(), vec![AppIndication::CallArrived { app_id: APP, peer: PEER }]);
    let id = h.ue.flows().by_app(APP).expect("call present");
    assert_eq!(h.ue.flows().get(id).and_then(|f| f.cc()).map(|c| c.state), Some(CcState::CallReceived));
    assert_eq!(h.net.count_nas(|p| matches!(p, NasPdu::Cc { msg: CcMessage::CallConfirmed, .. })), 1);

    h.ue.call_answered(APP);
    h.exchange();

    let flow = h.ue.flows().get(id).expect("call present");
    assert_eq!(flow.cc().map(|c| c.state), Some(CcState::Active));
    assert!(flow.rb.is_some());
    let stats = h.ue.stats();
    assert_eq!(stats.cc.calls_terminated, 1);
    assert_eq!(stats.cc.calls_answered, 1);
    assert_bearer_accounting(&h.ue);
}

/// Test a second call placed while the first connection is still held
#[test]
fn test_back_to_back_calls_share_connection() {
    init_test_logging();

    let mut h = harness_with(CallBehaviour::Answer);
    h.ue.start_call(PEER, APP, CallParams::default()).expect("call admitted");
    h.exchange();
    h.ue.end_call(APP);
    h.exchange();

    h.ue.start_call(PEER + 1, APP + 1, CallParams::default()).expect("call admitted");
    h.exchange();

    assert_eq!(h.net.connection_requests(), 1);
    assert_eq!(
        h.net.count_nas(|p| matches!(p, NasPdu::Mm(MmMessage::CmServiceRequest { .. }))),
        2
    );
    assert!(h
        .indications()
        .contains(&AppIndication::CallAnswered { app_id: APP + 1, peer: PEER + 1 }));
}

/// Test that calls and packet sessions coexist on one connection
#[test]
fn test_call_alongside_packet_session() {
    init_test_logging();

    let mut h = harness_with(CallBehaviour::Answer);
    h.ue.submit_ps_payload(udp_flow(80), packet(0), None);
    h.exchange();
    let call = h.ue.start_call(PEER, APP, CallParams::default()).expect("call admitted");
    h.exchange();

    let flows = h.ue.flows();
    assert_eq!(flows.len(), 2);
    assert_eq!(flows.get(call).and_then(|f| f.cc()).map(|c| c.state), Some(CcState::Active));
    assert!(flows.iter().any(|f| f.sm().map(|ctx| ctx.state) == Some(SmState::Active)));
    assert_eq!(h.net.connection_requests(), 1);
    assert_bearer_accounting(&h.ue);
}

/// Harness with an answered call and an active PDP context on one
/// connection.
fn call_and_session() -> SimHarness {
    let mut h = harness_with(CallBehaviour::Answer);
    h.ue.submit_ps_payload(udp_flow(80), packet(0), None);
    h.exchange();
    h.ue.start_call(PEER, APP, CallParams::default()).expect("call admitted");
    h.exchange();
    assert_eq!(configured_user_bearers(&h.ue).len(), 2);
    assert_bearer_accounting(&h.ue);
    h.take_indications();
    h
}

/// Test that a network release drops the call and ends the context
#[test]
fn test_connection_release_drops_call_and_session() {
    init_test_logging();

    let mut h = call_and_session();
    let release = h.net.release_connection();
    h.deliver_downlink(release);
    h.run_for(Duration::from_secs(2));

    assert!(h.ue.rrc().state().is_idle());
    assert_eq!(h.take_indications(), vec![AppIndication::CallDropped { app_id: APP, peer: PEER }]);
    assert!(h.ue.flows().is_empty());
    assert!(configured_user_bearers(&h.ue).is_empty());
    assert_eq!(h.ue.mm().active_connections(), 0);
    let stats = h.ue.stats();
    assert_eq!(stats.cc.calls_dropped, 1);
    assert_eq!(stats.sm.deactivations, 1);
    assert_bearer_accounting(&h.ue);
}

/// Test that a radio link failure drops the call and ends the context
#[test]
fn test_link_failure_drops_call_and_session() {
    init_test_logging();

    let mut h = call_and_session();
    let rb = h
        .ue
        .flows()
        .by_app(APP)
        .and_then(|id| h.ue.flows().get(id))
        .and_then(|f| f.rb)
        .expect("call bound to a bearer");
    h.ue.am_rlc_unrecoverable_error(rb);
    h.exchange();

    assert_eq!(h.ue.stats().rrc.link_failures, 1);
    assert!(h.ue.rrc().state().is_idle());
    assert_eq!(h.take_indications(), vec![AppIndication::CallDropped { app_id: APP, peer: PEER }]);
    assert!(h.ue.flows().is_empty());
    assert!(configured_user_bearers(&h.ue).is_empty());
    assert_bearer_accounting(&h.ue);
}
