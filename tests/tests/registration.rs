//! Registration integration tests
//!
//! Cell selection, location updating, GPRS attach and the release of the
//! RRC connection once neither domain needs it.

use integration_tests::{
    home_cell, init_test_logging, MockNetwork, MockNetworkConfig, MockNetworkEvent, SimHarness, TestUeConfig,
};
use umtsim_common::{CnDomain, SimTime, UeConfig};
use umtsim_l3::{GmmMessage, LocationUpdateType, MmMessage, NasPdu};
use umtsim_ue::lower::{TransportChannel, RB_DCCH_UM};
use umtsim_ue::nas::MmIdleSubstate;
use umtsim_ue::{GmmState, IdleSubstate, LowerLayerCommand, MmState, PmmState, RrcState, UpdateStatus};

/// Test power-on registration and the release that follows it
#[test]
fn test_location_update_then_release() {
    init_test_logging();

    let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());

    // Location update accepted right after camping
    let lu = h.net.uplink_nas();
    assert!(matches!(
        lu.first(),
        Some(NasPdu::Mm(MmMessage::LocationUpdatingRequest { update_type: LocationUpdateType::ImsiAttach, .. }))
    ));
    assert_eq!(h.ue.mm().update_status(), UpdateStatus::Updated);
    assert_eq!(h.ue.mm().tmsi(), Some(0x1000));
    assert_eq!(h.ue.mm().state(), MmState::WaitForNetworkCommand);
    assert!(h.ue.rrc().state().is_connected());

    // T3240 releases the CS signalling, the network then the connection
    h.run_until(SimTime::from_secs(12));
    assert_eq!(h.ue.rrc().state(), RrcState::Idle(IdleSubstate::CampedNormally));
    assert_eq!(h.ue.mm().state(), MmState::Idle(MmIdleSubstate::NormalService));
    assert!(h.net.events().contains(&MockNetworkEvent::SignallingReleaseIndication { domain: CnDomain::Cs }));
    assert!(h.net.events().contains(&MockNetworkEvent::RrcConnectionReleased));

    let stats = h.ue.stats();
    assert_eq!(stats.rrc.connection_attempts, 1);
    assert_eq!(stats.rrc.connection_successes, 1);
    assert_eq!(stats.rrc.signalling_release_indications, 1);
    assert_eq!(stats.rrc.connection_releases, 1);
    assert_eq!(stats.mm.location_updates, 1);
    assert_eq!(h.ue.rrc().configured_bearers().count(), 0);
}

/// Test that the release happens no earlier than T3240
#[test]
fn test_connection_held_for_t3240() {
    init_test_logging();

    let config = TestUeConfig::default().with_t3240_ms(4000).build();
    let mut h = SimHarness::camped_on(config, home_cell());

    h.run_until(SimTime::from_millis(3900));
    assert!(h.ue.rrc().state().is_connected());

    h.run_until(SimTime::from_secs(5));
    assert!(h.ue.rrc().state().is_idle());
    let release = h
        .first_command_time(|cmd| {
            matches!(cmd, LowerLayerCommand::ReleaseChannel { channel: TransportChannel::Dch })
        })
        .expect("dedicated channel released");
    assert!(release >= SimTime::from_secs(4));
}

/// Test a UE that never hears the network's answer to the release
#[test]
fn test_release_completes_after_t308() {
    init_test_logging();

    let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());
    h.run_until(SimTime::from_millis(10_100));
    // RRC CONNECTION RELEASE received, T308 still running
    assert!(h.ue.rrc().state().is_connected());

    h.run_until(SimTime::from_millis(10_600));
    assert!(h.ue.rrc().state().is_idle());
    // RELEASE COMPLETE sent once per T308 run
    let completes = h.count_commands(|cmd| matches!(cmd, LowerLayerCommand::SendOnBearer { rb: RB_DCCH_UM, .. }));
    assert_eq!(completes, 3);
}

/// Test GPRS attach at power on
#[test]
fn test_attach_on_power_on() {
    init_test_logging();

    let config = TestUeConfig::default().attach_on_power_on().build();
    let mut h = SimHarness::camped_on(config, home_cell());

    assert!(matches!(h.ue.gmm().state(), GmmState::Registered(_)));
    assert_eq!(h.ue.gmm().ptmsi(), Some(0x8000));
    assert_eq!(h.net.count_nas(|p| matches!(p, NasPdu::Gmm(GmmMessage::AttachComplete))), 1);
    // nothing to send: the network takes PS signalling back, the UE does
    // not ask for it
    assert_eq!(h.ue.gmm().pmm_state(), PmmState::Idle);
    assert!(!h.net.events().contains(&MockNetworkEvent::SignallingReleaseIndication { domain: CnDomain::Ps }));

    h.run_until(SimTime::from_secs(12));
    assert!(h.ue.rrc().state().is_idle());
    assert_eq!(
        h.net.events().iter().filter(|e| matches!(e, MockNetworkEvent::SignallingReleaseIndication { .. })).count(),
        1
    );
    assert_eq!(h.ue.stats().rrc.signalling_release_indications, 1);

    // a single RRC connection served both registrations
    assert_eq!(h.net.connection_requests(), 1);
    assert_eq!(h.ue.stats().gmm.attaches, 1);
}

/// Test a network that refuses the location area
#[test]
fn test_location_update_rejected() {
    init_test_logging();

    let net = MockNetwork::with_config(MockNetworkConfig { accept_location_update: false, ..Default::default() });
    let mut h = SimHarness::with_network(UeConfig::default(), net);
    h.add_cell(home_cell());
    h.exchange();

    assert_eq!(h.ue.mm().update_status(), UpdateStatus::RoamingNotAllowed);
    assert_eq!(h.ue.mm().state(), MmState::LocationUpdateRejected);

    h.run_until(SimTime::from_secs(12));
    assert_eq!(h.ue.mm().state(), MmState::Idle(MmIdleSubstate::LimitedService));
    assert!(h.ue.rrc().state().is_idle());
    // calls need a registration
    assert!(h.ue.start_call(9, 1, Default::default()).is_ok());
    h.exchange();
    assert!(h.ue.flows().is_empty());
    assert_eq!(h.ue.stats().cc.calls_rejected, 1);
}

/// Test that the UE stays silent without a suitable cell
#[test]
fn test_weak_cell_not_selected() {
    init_test_logging();

    let mut h = SimHarness::new(UeConfig::default());
    h.add_cell(home_cell().with_rscp(-110.0));
    h.run_for(std::time::Duration::from_secs(10));

    assert_eq!(h.ue.rrc().state(), RrcState::Idle(IdleSubstate::NoPlmn));
    assert_eq!(h.net.connection_requests(), 0);
    assert!(h.ue.gmm().state().is_deregistered());
}
