//! Radio environment integration tests
//!
//! Cell staleness, radio link failure, recovery and idle mode reselection.

use std::time::Duration;

use integration_tests::{
    assert_bearer_accounting, configured_user_bearers, home_cell, init_test_logging, neighbour_cell, SimHarness,
};
use umtsim_common::{SimTime, UeConfig};
use umtsim_l3::{LocationUpdateType, MmMessage, NasPdu};
use umtsim_ue::nas::MmIdleSubstate;
use umtsim_ue::{AppIndication, CallParams, IdleSubstate, LowerLayerCommand, MmState, RrcState, UpdateStatus};

const APP: u32 = 3;
const PEER: u32 = 77;

fn count_location_updates(h: &SimHarness, update: LocationUpdateType) -> usize {
    h.net.count_nas(|p| {
        matches!(p, NasPdu::Mm(MmMessage::LocationUpdatingRequest { update_type, .. }) if *update_type == update)
    })
}

/// Harness with an answered call on the home cell.
fn call_in_progress() -> SimHarness {
    let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());
    h.ue.start_call(PEER, APP, CallParams::default()).expect("call admitted");
    h.exchange();
    assert!(h.take_indications().contains(&AppIndication::CallAnswered { app_id: APP, peer: PEER }));
    h
}

/// Test that losing the only cell during a call drops the call
#[test]
fn test_stale_cell_causes_link_failure() {
    init_test_logging();

    let mut h = call_in_progress();
    let cell = home_cell().id;
    h.remove_cell(cell);

    // the cell is still trusted while its samples are fresh
    h.run_until(SimTime::from_secs(9));
    assert!(h.ue.rrc().state().is_connected());

    h.run_until(SimTime::from_secs(16));
    assert_eq!(h.take_indications(), vec![AppIndication::CallDropped { app_id: APP, peer: PEER }]);
    assert!(h.ue.flows().is_empty());
    assert_eq!(h.ue.rrc().state(), RrcState::Idle(IdleSubstate::NoPlmn));
    assert!(h.ue.rrc().cells().is_empty());
    assert_eq!(h.ue.mm().state(), MmState::Idle(MmIdleSubstate::NoCellAvailable));
    assert!(configured_user_bearers(&h.ue).is_empty());

    let stats = h.ue.stats();
    assert_eq!(stats.rrc.link_failures, 1);
    assert_eq!(stats.rrc.cell_searches, 2);
    assert_eq!(stats.cc.calls_dropped, 1);
    assert_eq!(h.count_commands(|c| matches!(c, LowerLayerCommand::StartCellSearch)), 2);

    // back in coverage: same location area, no new registration
    h.add_cell(home_cell());
    h.run_for(Duration::from_secs(2));
    assert_eq!(h.ue.rrc().state(), RrcState::Idle(IdleSubstate::CampedNormally));
    assert_eq!(h.ue.mm().state(), MmState::Idle(MmIdleSubstate::NormalService));
    assert_eq!(h.ue.mm().update_status(), UpdateStatus::Updated);
    assert_eq!(count_location_updates(&h, LocationUpdateType::ImsiAttach), 1);
    assert_eq!(count_location_updates(&h, LocationUpdateType::Normal), 0);
    assert_bearer_accounting(&h.ue);
}

/// Test an unrecoverable RLC error on the traffic bearer
#[test]
fn test_rlc_error_releases_connection() {
    init_test_logging();

    let mut h = call_in_progress();
    let rb = h
        .ue
        .flows()
        .by_app(APP)
        .and_then(|id| h.ue.flows().get(id))
        .and_then(|f| f.rb)
        .expect("call bound to a bearer");

    h.ue.am_rlc_unrecoverable_error(rb);
    h.exchange();

    assert_eq!(h.take_indications(), vec![AppIndication::CallDropped { app_id: APP, peer: PEER }]);
    assert_eq!(h.ue.stats().rrc.link_failures, 1);
    assert!(h.ue.rrc().state().is_idle());
    // the cell is still audible and selected again at once
    assert_eq!(h.ue.rrc().primary_cell(), Some(home_cell().id));

    h.run_for(Duration::from_secs(2));
    assert_eq!(h.ue.rrc().state(), RrcState::Idle(IdleSubstate::CampedNormally));

    // errors on bearers that are not configured are ignored
    h.ue.am_rlc_unrecoverable_error(rb);
    assert_eq!(h.ue.stats().rrc.link_failures, 1);
}

/// Test idle mode reselection into a new location area
#[test]
fn test_reselection_triggers_location_update() {
    init_test_logging();

    let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());
    h.run_until(SimTime::from_secs(12));
    assert!(h.ue.rrc().state().is_idle());

    // home fades below the search threshold while the neighbour is strong
    h.net.config_mut().area = neighbour_cell().area;
    h.add_cell(home_cell().with_rscp(-88.0));
    h.add_cell(neighbour_cell());
    h.run_for(Duration::from_secs(20));

    assert_eq!(h.ue.rrc().primary_cell(), Some(neighbour_cell().id));
    assert_eq!(h.ue.stats().rrc.cell_reselections, 1);
    assert_eq!(count_location_updates(&h, LocationUpdateType::Normal), 1);
    assert_eq!(h.ue.mm().update_status(), UpdateStatus::Updated);
    assert_eq!(h.ue.mm().area(), Some(neighbour_cell().area));
}
