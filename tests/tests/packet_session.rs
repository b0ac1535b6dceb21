//! Packet session integration tests
//!
//! PDP context activation on demand, uplink buffering, network and idle
//! deactivation, rejected contexts and contexts lost with the connection.

use std::time::Duration;

use bytes::Bytes;
use integration_tests::{
    assert_bearer_accounting, configured_user_bearers, home_cell, init_test_logging, packet, packet_seq,
    udp_flow, MockNetwork, MockNetworkConfig, SimHarness, TestUeConfig,
};
use umtsim_common::{SimTime, UeConfig};
use umtsim_l3::{GmmMessage, NasPdu, SmMessage};
use umtsim_ue::lower::RB_DCCH_AM_RRC;
use umtsim_ue::{AppIndication, GmmState, PmmState, SmState, UeLayer3};

const SERVER_PORT: u16 = 5000;

fn submit_packets(ue: &mut UeLayer3, seqs: std::ops::Range<u32>) {
    for seq in seqs {
        ue.submit_ps_payload(udp_flow(SERVER_PORT), packet(seq), None);
    }
}

/// Sequence numbers of the uplink user plane PDUs the network received.
fn received_seqs(h: &SimHarness) -> Vec<u32> {
    h.net.user_data().iter().filter_map(|(_, data)| packet_seq(data)).collect()
}

/// Harness with one active PDP context that carried packets 0..3.
fn active_context(config: UeConfig) -> SimHarness {
    let mut h = SimHarness::camped_on(config, home_cell());
    submit_packets(&mut h.ue, 0..3);
    h.exchange();
    h
}

/// Test that payload sent while detached is delivered in order once the context is up
#[test]
fn test_payload_waits_for_attach_and_activation() {
    init_test_logging();

    let mut h = active_context(UeConfig::default());

    // attach carried the follow-on request, activation rode on it
    assert_eq!(
        h.net.count_nas(|p| matches!(p, NasPdu::Gmm(GmmMessage::AttachRequest { attach_type, .. }) if attach_type.follow_on())),
        1
    );
    assert_eq!(
        h.net.count_nas(|p| matches!(p, NasPdu::Sm { msg: SmMessage::ActivatePdpContextRequest { nsapi: 5, .. }, .. })),
        1
    );
    assert!(matches!(h.ue.gmm().state(), GmmState::Registered(_)));

    let id = h.ue.flows().by_classifier(&udp_flow(SERVER_PORT)).expect("flow created");
    let flow = h.ue.flows().get(id).expect("flow present");
    assert_eq!(flow.sm().map(|ctx| ctx.state), Some(SmState::Active));
    assert_eq!(flow.rab_id, Some(5));
    assert_eq!(flow.buffered(), 0);

    assert_eq!(received_seqs(&h), vec![0, 1, 2]);
    let rbs: Vec<_> = h.net.user_data().iter().map(|(rb, _)| *rb).collect();
    assert!(rbs.iter().all(|rb| Some(*rb) == flow.rb));

    // later packets go straight to the bearer
    submit_packets(&mut h.ue, 3..5);
    h.run_until(SimTime::from_secs(20));
    assert_eq!(received_seqs(&h), vec![0, 1, 2, 3, 4]);

    let ps = h.ue.stats().ps_packets;
    assert_eq!(ps.from_upper, 5);
    assert_eq!(ps.enqueued, 3);
    assert_eq!(ps.to_lower, 5);
    assert_eq!(ps.dropped, 0);
    assert_bearer_accounting(&h.ue);
}

/// Test that downlink packets reach the application
#[test]
fn test_downlink_payload_delivered() {
    init_test_logging();

    let mut h = active_context(UeConfig::default());
    let rb = h.ue.rrc().rb_for_rab(5).expect("bearer configured");
    h.take_indications();

    let data = Bytes::from_static(b"response");
    h.deliver_downlink(vec![(rb, data.clone())]);

    assert_eq!(
        h.take_indications(),
        vec![AppIndication::PsPayload { classifier: udp_flow(SERVER_PORT), data }]
    );
    assert_eq!(h.ue.stats().ps_packets.from_lower, 1);
}

/// Test buffer overflow while the context is being activated
#[test]
fn test_buffer_overflow_drops_oldest() {
    init_test_logging();

    let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());
    let capacity = h.ue.config().flows.buffer_capacity as u32;
    submit_packets(&mut h.ue, 0..capacity + 6);
    h.exchange();

    let expected: Vec<u32> = (6..capacity + 6).collect();
    assert_eq!(received_seqs(&h), expected);
    let ps = h.ue.stats().ps_packets;
    assert_eq!(ps.dropped, 6);
    assert_eq!(ps.to_lower, u64::from(capacity));
}

/// Test idle timeout deactivation and the release of the PS signalling
#[test]
fn test_idle_context_deactivated() {
    init_test_logging();

    let config = TestUeConfig::default().with_ps_idle_time_ms(15_000).build();
    let mut h = active_context(config);

    h.run_until(SimTime::from_secs(15));
    assert_eq!(h.ue.flows().len(), 1);

    h.run_until(SimTime::from_secs(25));
    assert!(h.ue.flows().is_empty());
    assert_eq!(
        h.net.count_nas(|p| matches!(p, NasPdu::Sm { msg: SmMessage::DeactivatePdpContextRequest { .. }, .. })),
        1
    );
    assert_eq!(h.ue.stats().sm.deactivations, 1);
    assert!(configured_user_bearers(&h.ue).is_empty());
    assert_eq!(h.net.rab_count(), 0);
    // neither domain needs the connection any more
    assert!(h.ue.rrc().state().is_idle());
    assert_eq!(h.ue.gmm().pmm_state(), PmmState::Idle);
}

/// Test network-initiated deactivation
#[test]
fn test_network_deactivation() {
    init_test_logging();

    let mut h = active_context(UeConfig::default());
    let id = h.ue.flows().by_classifier(&udp_flow(SERVER_PORT)).expect("flow created");
    let ti = h.ue.flows().get(id).map(|f| f.ti()).expect("flow present");

    let pdus = h.net.deactivate_pdp(ti, 5);
    h.deliver_downlink(pdus);

    assert!(!h.ue.flows().contains(id));
    assert_eq!(
        h.net.count_nas(|p| matches!(p, NasPdu::Sm { msg: SmMessage::DeactivatePdpContextAccept, .. })),
        1
    );
    assert!(configured_user_bearers(&h.ue).is_empty());
    assert_bearer_accounting(&h.ue);
}

/// Test that a rejected context drops payload until it is purged
#[test]
fn test_rejected_context_purged() {
    init_test_logging();

    let net = MockNetwork::with_config(MockNetworkConfig { accept_pdp: false, ..Default::default() });
    let mut h = SimHarness::with_network(UeConfig::default(), net);
    h.add_cell(home_cell());
    h.exchange();
    h.take_indications();

    submit_packets(&mut h.ue, 0..1);
    h.exchange();
    assert_eq!(
        h.take_indications(),
        vec![AppIndication::SessionRejected { classifier: udp_flow(SERVER_PORT) }]
    );
    assert_eq!(h.ue.stats().sm.activations_rejected, 1);

    // no retry storm: later payload is dropped
    submit_packets(&mut h.ue, 1..4);
    h.exchange();
    assert_eq!(h.ue.stats().ps_packets.dropped, 4);
    assert_eq!(
        h.net.count_nas(|p| matches!(p, NasPdu::Sm { msg: SmMessage::ActivatePdpContextRequest { .. }, .. })),
        1
    );
    assert!(h.net.user_data().is_empty());

    h.run_until(SimTime::from_secs(35));
    assert_eq!(h.ue.flows().len(), 1);
    h.run_until(SimTime::from_secs(41));
    assert!(h.ue.flows().is_empty());
}

/// Test user-requested detach
#[test]
fn test_detach_removes_contexts() {
    init_test_logging();

    let mut h = active_context(UeConfig::default());
    h.ue.detach();
    h.exchange();

    assert!(h.ue.gmm().state().is_deregistered());
    assert!(h.ue.flows().is_empty());
    assert_eq!(h.ue.stats().gmm.detaches, 1);
    assert!(configured_user_bearers(&h.ue).is_empty());
    assert_bearer_accounting(&h.ue);
}

/// Test that a network release of the connection ends the context
#[test]
fn test_connection_release_ends_context() {
    init_test_logging();

    let mut h = active_context(UeConfig::default());
    assert_eq!(configured_user_bearers(&h.ue).len(), 1);
    assert_bearer_accounting(&h.ue);

    let release = h.net.release_connection();
    h.deliver_downlink(release);
    h.run_for(Duration::from_secs(2));

    assert!(h.ue.rrc().state().is_idle());
    assert!(h.ue.flows().is_empty());
    assert!(configured_user_bearers(&h.ue).is_empty());
    assert_eq!(h.ue.gmm().pmm_state(), PmmState::Idle);
    assert_eq!(h.ue.stats().sm.deactivations, 1);
    assert_bearer_accounting(&h.ue);

    // new payload activates a fresh context over a new connection
    submit_packets(&mut h.ue, 3..4);
    h.exchange();
    let id = h.ue.flows().by_classifier(&udp_flow(SERVER_PORT)).expect("flow created");
    assert_eq!(h.ue.flows().get(id).and_then(|f| f.sm()).map(|ctx| ctx.state), Some(SmState::Active));
    assert_eq!(received_seqs(&h), vec![0, 1, 2, 3]);
    assert_eq!(h.ue.stats().gmm.service_requests, 1);
    assert_bearer_accounting(&h.ue);
}

/// Test that a radio link failure ends the context
#[test]
fn test_link_failure_ends_context() {
    init_test_logging();

    let mut h = active_context(UeConfig::default());
    h.ue.am_rlc_unrecoverable_error(RB_DCCH_AM_RRC);
    h.exchange();

    assert_eq!(h.ue.stats().rrc.link_failures, 1);
    assert!(h.ue.rrc().state().is_idle());
    assert!(h.ue.flows().is_empty());
    assert!(configured_user_bearers(&h.ue).is_empty());
    assert_eq!(h.ue.gmm().pmm_state(), PmmState::Idle);
    assert_bearer_accounting(&h.ue);
}
