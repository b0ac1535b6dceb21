//! UE NAS (Non-Access Stratum) Layer
//!
//! Mobility management and connection management of 3GPP TS 24.008:
//! - [`mm`]: CS domain registration and MM connections
//! - [`gmm`]: PS domain attach, routing area update and service request
//! - [`cc`]: per-call call control
//! - [`sm`]: per-context session management
//!
//! MM and GMM are single instances owned by the UE context. CC and SM state
//! lives in the flow records of the [`crate::flow::FlowRegistry`]; their
//! handlers receive the flow and the sibling sublayers they drive, and
//! return a [`FlowOutcome`] telling the UE context whether the flow survives.

pub mod cc;
pub mod gmm;
pub mod mm;
pub mod sm;

pub use cc::{CallEnd, CcCall, CcState};
pub use gmm::{DeregSubstate, Gmm, GmmState, PmmState, RegSubstate};
pub use mm::{Mm, MmIdleSubstate, MmState, UpdateStatus};
pub use sm::{SmContext, SmState};

use std::fmt;

use umtsim_l3::{ProtocolDiscriminator, RejectCause, TransactionId};

/// Correlation key of an MM connection: protocol discriminator and the
/// transaction identifier as the UE sends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MmConnKey {
    pub pd: ProtocolDiscriminator,
    pub ti: TransactionId,
}

impl MmConnKey {
    pub fn new(pd: ProtocolDiscriminator, ti: TransactionId) -> Self {
        Self { pd, ti }
    }
}

impl fmt::Display for MmConnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}{}", self.pd, self.ti.value, if self.ti.flag { "'" } else { "" })
    }
}

/// Why an MM connection could not be provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmConnFailure {
    /// CM SERVICE REJECT
    Rejected(RejectCause),
    /// T3230 expired
    Timeout,
    /// RRC connection failed or was released
    LowerLayer,
    /// MM is not in a state that allows CS service
    NotRegistered,
}

impl fmt::Display for MmConnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmConnFailure::Rejected(cause) => write!(f, "rejected ({cause:?})"),
            MmConnFailure::Timeout => write!(f, "timeout"),
            MmConnFailure::LowerLayer => write!(f, "lower layer failure"),
            MmConnFailure::NotRegistered => write!(f, "not registered"),
        }
    }
}

/// Result of a per-flow CC or SM handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum FlowOutcome {
    Keep,
    /// The transaction is over; the flow must be removed from the registry
    Remove,
}
