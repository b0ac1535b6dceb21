//! Test utility functions for integration tests
//!
//! Logging setup and invariant checks shared by the scenario tests.

use std::collections::BTreeSet;

use tracing_subscriber::{fmt, EnvFilter};
use umtsim_ue::lower::{FIRST_USER_RB, LAST_USER_RB};
use umtsim_ue::{CcState, RbId, UeLayer3};

/// Initialize logging for tests
///
/// Uses RUST_LOG environment variable if set, otherwise defaults to "info"
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// User plane bearers RRC has configured in the lower layer.
pub fn configured_user_bearers(ue: &UeLayer3) -> BTreeSet<RbId> {
    ue.rrc()
        .configured_bearers()
        .filter(|rb| (FIRST_USER_RB..=LAST_USER_RB).contains(rb))
        .collect()
}

/// Checks the bearer accounting of a quiescent UE: every radio bearer a
/// flow points at is configured, every configured user plane bearer
/// belongs to exactly one flow, and there are as many of them as active
/// calls and PDP contexts.
pub fn assert_bearer_accounting(ue: &UeLayer3) {
    let configured = configured_user_bearers(ue);
    let bound: Vec<RbId> = ue.flows().iter().filter_map(|f| f.rb).collect();
    let active = ue
        .flows()
        .iter()
        .filter(|f| {
            f.cc().is_some_and(|call| call.state == CcState::Active) || f.sm().is_some_and(|ctx| ctx.is_active())
        })
        .count();
    assert_eq!(configured.len(), active, "{} user bearers for {active} active flows", configured.len());

    for rb in &bound {
        assert!(configured.contains(rb), "flow bound to unconfigured RB{rb}");
    }
    for rb in &configured {
        let owners = bound.iter().filter(|b| *b == rb).count();
        assert_eq!(owners, 1, "RB{rb} bound to {owners} flows");
    }
}

/// Checks that no two flows of the same protocol and direction share a
/// transaction identifier.
pub fn assert_unique_transaction_ids(ue: &UeLayer3) {
    let mut seen = BTreeSet::new();
    for flow in ue.flows().iter() {
        let key = (u8::from(flow.pd()), flow.direction, flow.ti());
        assert!(seen.insert(key), "TI {} used twice by {:?} flows", flow.ti(), flow.pd());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umtsim_common::UeConfig;

    #[test]
    fn test_fresh_ue_has_no_bearers() {
        let ue = UeLayer3::new(UeConfig::default());
        assert!(configured_user_bearers(&ue).is_empty());
        assert_bearer_accounting(&ue);
        assert_unique_transaction_ids(&ue);
    }
}
