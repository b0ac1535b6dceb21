//! Integration test framework for umtsim
#![allow(missing_docs)]
//!
//! This crate provides test utilities and mock components for integration testing
//! of the umtsim UE Layer-3 stack.
//!
//! # Components
//!
//! - [`mock_network`] - Mock RNC and core network answering RRC and NAS procedures
//! - [`sim_harness`] - Discrete-event harness joining one UE to the mock network
//! - [`test_fixtures`] - Cells, UE configurations and traffic helpers
//! - [`test_utils`] - Logging setup and invariant checks
//!
//! # Test Categories
//!
//! 1. **Registration Tests** - Camping, location updating and connection release
//! 2. **Packet Session Tests** - PDP context activation, buffering and idle teardown
//! 3. **Call Tests** - Originating, terminating, busy and unanswered calls
//! 4. **Radio Tests** - Cell staleness, radio link failure and recovery
//! 5. **Invariant Tests** - Transaction identifiers, bearers and stray messages

pub mod mock_network;
pub mod sim_harness;
pub mod test_fixtures;
pub mod test_utils;

pub use mock_network::{CallBehaviour, MockNetwork, MockNetworkConfig, MockNetworkEvent, CS_RAB_BASE};
pub use sim_harness::{SimHarness, MEASUREMENT_PERIOD};
pub use test_fixtures::{home_cell, neighbour_cell, packet, packet_seq, udp_flow, TestCell, TestUeConfig, TEST_PLMN};
pub use test_utils::{
    assert_bearer_accounting, assert_unique_transaction_ids, configured_user_bearers, init_test_logging,
};
