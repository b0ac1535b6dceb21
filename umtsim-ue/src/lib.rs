//! umtsim UE (User Equipment) Library
//!
//! UE-side Layer-3 control plane of a UMTS terminal for discrete-event
//! simulation:
//!
//! - Timer/Event core on the simulation clock
//! - Cell and measurement tracking, RRC connection and radio bearer control
//! - MM and GMM mobility management for the CS and PS domains
//! - CC call control and SM session management, one record per flow
//! - Flow registry binding application traffic to transactions and bearers
//!
//! The stack is single threaded and synchronous. [`UeLayer3`] is the entry
//! point: feed it lower-layer PDUs, measurements, application requests and
//! clock advances, and collect [`LowerLayerCommand`]s and
//! [`AppIndication`]s in return.

pub mod app;
pub mod flow;
pub mod lower;
pub mod nas;
pub mod rrc;
pub mod services;
pub mod stats;
pub mod timer;
pub mod ue;

#[cfg(test)]
mod test_support;

pub use app::{AppId, AppIndication, CallParams, CallRejectCause, PeerId};
pub use flow::{Flow, FlowId, FlowProto, FlowRegistry, SweepResult, FIRST_NSAPI, LAST_NSAPI};
pub use lower::{LowerLayerCommand, MetricKind, RbId};
pub use nas::{CallEnd, CcState, GmmState, MmState, PmmState, SmState, UpdateStatus};
pub use rrc::{ConnectedSubstate, IdleSubstate, Rrc, RrcState};
pub use stats::{PacketStats, UeStats};
pub use timer::{TimerCore, TimerEvent, TimerHandle};
pub use ue::UeLayer3;
