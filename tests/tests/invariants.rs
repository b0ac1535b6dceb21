//! Invariant integration tests
//!
//! Transaction identifier allocation, bearer accounting and robustness
//! against messages for transactions the UE does not know.

use integration_tests::{
    assert_bearer_accounting, assert_unique_transaction_ids, home_cell, init_test_logging, packet, udp_flow,
    CallBehaviour, MockNetwork, MockNetworkConfig, SimHarness,
};
use umtsim_common::UeConfig;
use umtsim_l3::{CcCause, CcMessage, NasPdu, SmMessage, TransactionId};
use umtsim_ue::{AppIndication, CallParams, CallRejectCause};

/// Test that at most seven originating transactions exist at a time
#[test]
fn test_transaction_identifiers_exhausted() {
    init_test_logging();

    let net = MockNetwork::with_config(MockNetworkConfig { call_behaviour: CallBehaviour::Silent, ..Default::default() });
    let mut h = SimHarness::with_network(UeConfig::default(), net);
    h.add_cell(home_cell());
    h.exchange();

    for app in 0..7 {
        assert!(h.ue.start_call(100 + app, app, CallParams::default()).is_ok());
    }
    assert_eq!(h.ue.start_call(107, 7, CallParams::default()), Err(CallRejectCause::NoResources));
    assert_unique_transaction_ids(&h.ue);

    // the MM connection requests go out one after the other
    h.exchange();
    assert_eq!(h.net.count_nas(|p| matches!(p, NasPdu::Cc { msg: CcMessage::Setup { .. }, .. })), 7);
    assert_eq!(h.ue.mm().active_connections(), 7);

    for app in 0..7 {
        h.ue.end_call(app);
    }
    h.exchange();
    assert!(h.ue.flows().is_empty());

    // identifiers are free again
    assert!(h.ue.start_call(200, 8, CallParams::default()).is_ok());
}

/// Test that calls and packet sessions share the identifier pool
#[test]
fn test_calls_and_sessions_share_identifiers() {
    init_test_logging();

    let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());
    for port in 0..3 {
        h.ue.submit_ps_payload(udp_flow(6000 + port), packet(u32::from(port)), None);
    }
    h.exchange();
    for app in 0..4 {
        h.ue.start_call(300 + app, app, CallParams::default()).expect("call admitted");
        h.exchange();
    }
    assert_eq!(h.ue.flows().len(), 7);
    assert_unique_transaction_ids(&h.ue);
    assert_bearer_accounting(&h.ue);
    h.take_indications();

    assert_eq!(h.ue.start_call(400, 9, CallParams::default()), Err(CallRejectCause::NoResources));
    h.ue.submit_ps_payload(udp_flow(7000), packet(0), None);
    h.exchange();
    assert_eq!(h.take_indications(), vec![AppIndication::SessionRejected { classifier: udp_flow(7000) }]);
    assert_eq!(h.ue.flows().len(), 7);
}

/// Test that stray messages for unknown transactions change nothing
#[test]
fn test_unknown_transactions_ignored() {
    init_test_logging();

    let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());
    assert!(h.ue.rrc().state().is_connected());
    let before = h.net.uplink_nas().len();

    h.network_nas(NasPdu::Cc {
        ti: TransactionId::new(3, true),
        msg: CcMessage::ReleaseComplete { cause: CcCause::NormalCallClearing },
    });
    h.network_nas(NasPdu::Sm { ti: TransactionId::new(2, true), msg: SmMessage::DeactivatePdpContextAccept });
    h.network_nas(NasPdu::Cc { ti: TransactionId::new(4, true), msg: CcMessage::Alerting });

    assert!(h.ue.flows().is_empty());
    assert!(h.indications().is_empty());
    assert_eq!(h.net.uplink_nas().len(), before);
}

/// Test a duplicated clearing message after the call is gone
#[test]
fn test_duplicate_release_complete_ignored() {
    init_test_logging();

    let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());
    h.ue.start_call(42, 1, CallParams::default()).expect("call admitted");
    h.exchange();
    h.ue.end_call(1);
    h.exchange();
    assert!(h.ue.flows().is_empty());
    let ended = h.ue.stats().cc.calls_ended;

    h.network_nas(NasPdu::Cc {
        ti: TransactionId::new(0, true),
        msg: CcMessage::ReleaseComplete { cause: CcCause::NormalCallClearing },
    });

    assert!(h.ue.flows().is_empty());
    assert_eq!(h.ue.stats().cc.calls_ended, ended);
    assert_bearer_accounting(&h.ue);
}
