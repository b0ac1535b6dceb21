//! Per-UE statistics
//!
//! Counters are grouped by sublayer and serialised as one YAML document by
//! the scenario runner.

use serde::{Deserialize, Serialize};
use umtsim_common::CnDomain;
use umtsim_l3::ProtocolDiscriminator;

/// Sent/received message counters of one protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCounters {
    pub sent: u64,
    pub received: u64,
}

/// RRC counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RrcStats {
    pub messages: MessageCounters,
    pub cell_searches: u64,
    pub cell_selections: u64,
    pub cell_reselections: u64,
    pub connection_attempts: u64,
    pub connection_successes: u64,
    pub connection_failures: u64,
    pub connection_rejects: u64,
    pub connection_releases: u64,
    pub link_failures: u64,
    pub active_set_updates: u64,
    pub measurement_reports: u64,
    pub signalling_release_indications: u64,
    pub pagings: u64,
}

/// MM counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmStats {
    pub messages: MessageCounters,
    pub location_updates: u64,
    pub location_update_failures: u64,
    pub cm_service_requests: u64,
    pub cm_service_rejects: u64,
}

/// GMM counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmmStats {
    pub messages: MessageCounters,
    pub attach_attempts: u64,
    pub attaches: u64,
    pub attach_failures: u64,
    pub detaches: u64,
    pub routing_area_updates: u64,
    pub service_requests: u64,
}

/// CC counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcStats {
    pub messages: MessageCounters,
    pub calls_originated: u64,
    pub calls_terminated: u64,
    pub calls_answered: u64,
    pub calls_ended: u64,
    pub calls_dropped: u64,
    pub calls_rejected: u64,
}

/// SM counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmStats {
    pub messages: MessageCounters,
    pub activations_requested: u64,
    pub activations_accepted: u64,
    pub activations_rejected: u64,
    pub network_requested: u64,
    pub deactivations: u64,
}

/// User plane packet counters of one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketStats {
    /// Submitted by the application
    pub from_upper: u64,
    /// Buffered while the flow had no bearer
    pub enqueued: u64,
    /// Handed to the lower layer
    pub to_lower: u64,
    /// Discarded (buffer overflow, rejected flow, teardown)
    pub dropped: u64,
    /// Received from the lower layer and delivered upward
    pub from_lower: u64,
}

/// All counters of one UE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeStats {
    pub rrc: RrcStats,
    pub mm: MmStats,
    pub gmm: GmmStats,
    pub cc: CcStats,
    pub sm: SmStats,
    pub cs_packets: PacketStats,
    pub ps_packets: PacketStats,
}

impl UeStats {
    fn counters(&mut self, pd: ProtocolDiscriminator) -> Option<&mut MessageCounters> {
        match pd {
            ProtocolDiscriminator::Rr => Some(&mut self.rrc.messages),
            ProtocolDiscriminator::Mm => Some(&mut self.mm.messages),
            ProtocolDiscriminator::Gmm => Some(&mut self.gmm.messages),
            ProtocolDiscriminator::Cc => Some(&mut self.cc.messages),
            ProtocolDiscriminator::Sm => Some(&mut self.sm.messages),
            _ => None,
        }
    }

    pub fn count_sent(&mut self, pd: ProtocolDiscriminator) {
        if let Some(c) = self.counters(pd) {
            c.sent += 1;
        }
    }

    pub fn count_received(&mut self, pd: ProtocolDiscriminator) {
        if let Some(c) = self.counters(pd) {
            c.received += 1;
        }
    }

    /// Packet counters of a domain.
    pub fn packets(&mut self, domain: CnDomain) -> &mut PacketStats {
        match domain {
            CnDomain::Cs => &mut self.cs_packets,
            CnDomain::Ps => &mut self.ps_packets,
        }
    }

    /// Serializes the counters to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
