//! Application boundary
//!
//! Traffic generators above the UE talk to the Layer-3 stack through the
//! downstream methods of [`crate::UeLayer3`] (`start_call`, `end_call`,
//! `call_answered`, `submit_ps_payload`, `submit_cs_payload`) and receive
//! [`AppIndication`]s in return.
//!
//! This module also hosts configuration loading for the scenario runner.

mod config_loader;

pub use config_loader::{
    load_and_validate_ue_config, load_ue_config, load_ue_config_from_str, validate_ue_config,
    ConfigError, ConfigValidationError,
};

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use umtsim_common::FlowClassifier;

/// Application instance identifier, shared by both ends of a call
pub type AppId = u32;

/// Identity of the remote party of a call
pub type PeerId = u32;

/// Parameters of a mobile-originated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallParams {
    /// Planned call duration; `None` for an open ended call
    #[serde(default, with = "opt_millis")]
    pub duration: Option<Duration>,
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

/// Why a call attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallRejectCause {
    /// No answer from the network within the guard budget
    UserUnreachable,
    /// Remote party busy
    UserBusy,
    /// Network refused the call or the MM connection
    NetworkRejected,
    /// No transaction identifier or signalling connection available
    NoResources,
    /// UE not registered in the CS domain
    ServiceUnavailable,
}

impl fmt::Display for CallRejectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallRejectCause::UserUnreachable => "user unreachable",
            CallRejectCause::UserBusy => "user busy",
            CallRejectCause::NetworkRejected => "network rejected",
            CallRejectCause::NoResources => "no resources",
            CallRejectCause::ServiceUnavailable => "service unavailable",
        };
        f.write_str(s)
    }
}

/// Notification toward the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppIndication {
    /// Downlink packet of a PS flow
    PsPayload { classifier: FlowClassifier, data: Bytes },
    /// Downlink voice frame of a call
    CsPayload { app_id: AppId, data: Bytes },
    /// Incoming call is ringing
    CallArrived { app_id: AppId, peer: PeerId },
    /// Call reached the active state
    CallAnswered { app_id: AppId, peer: PeerId },
    /// Call cleared normally
    CallEnded { app_id: AppId, peer: PeerId },
    /// Call lost due to a signalling or radio failure
    CallDropped { app_id: AppId, peer: PeerId },
    /// Call attempt failed
    CallRejected { app_id: AppId, peer: PeerId, cause: CallRejectCause },
    /// PS flow could not be admitted or its context was rejected
    SessionRejected { classifier: FlowClassifier },
}
