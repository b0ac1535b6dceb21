//! Common types and utilities for umtsim
//!
//! Shared identity types, configuration structures, logging setup and the
//! simulated clock used by every umtsim crate.

pub mod config;
pub mod error;
pub mod logging;
pub mod sim_time;
pub mod types;

pub use config::{
    AttachMode, FlowParams, MeasurementParams, NasTimerOverrides, RrcParams, UeConfig,
};
pub use error::Error;
pub use logging::{
    format_hex_compact, init_logging, init_logging_with_filter, log_protocol_message, Direction,
    HexDump, LogLevel,
};
pub use sim_time::SimTime;
pub use types::*;
