//! Lower-layer (radio/MAC/RLC) contract
//!
//! The Layer-3 stack never touches the radio directly. It emits
//! [`LowerLayerCommand`]s that the embedding simulator executes, and it is
//! fed received PDUs, CPICH measurements and RLC errors through the inbound
//! methods on [`crate::UeLayer3`].

use std::fmt;

use bytes::Bytes;
use umtsim_common::CellId;

/// Radio bearer identity
pub type RbId = u8;

/// RB0: CCCH on RACH/FACH
pub const RB_CCCH: RbId = 0;
/// RB1: DCCH, unacknowledged mode
pub const RB_DCCH_UM: RbId = 1;
/// RB2: DCCH, acknowledged mode, RRC
pub const RB_DCCH_AM_RRC: RbId = 2;
/// RB3: DCCH, acknowledged mode, NAS direct transfer
pub const RB_DCCH_AM_NAS: RbId = 3;
/// First radio bearer available to user plane RABs
pub const FIRST_USER_RB: RbId = 5;
/// Last radio bearer identity
pub const LAST_USER_RB: RbId = 31;
/// Pseudo bearer carrying broadcast system information
pub const RB_BCCH: RbId = 0xFE;
/// Pseudo bearer carrying paging
pub const RB_PCCH: RbId = 0xFD;

/// Signalling radio bearers configured on entering CELL_DCH.
pub const DEDICATED_SIGNALLING_RBS: [RbId; 3] = [RB_DCCH_UM, RB_DCCH_AM_RRC, RB_DCCH_AM_NAS];

/// Transport channel kinds requested from the lower layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportChannel {
    /// Random access channel (uplink common)
    Rach,
    /// Forward access channel (downlink common)
    Fach,
    /// Dedicated channel
    Dch,
}

/// RLC mode of a radio bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlcMode {
    Transparent,
    Unacknowledged,
    Acknowledged,
}

/// Kind of CPICH measurement reported by the physical layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Received signal code power (dBm)
    Rscp,
    /// Energy per chip over noise (dB)
    EcNo,
}

/// Command toward the radio/MAC/RLC layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LowerLayerCommand {
    ConfigureChannel { channel: TransportChannel },
    ReleaseChannel { channel: TransportChannel },
    ConfigureRadioBearer { rb: RbId, mode: RlcMode, channel: TransportChannel },
    ReleaseRadioBearer { rb: RbId },
    /// Add or remove a radio link to `cell` on the dedicated channel
    ConfigureDownlink { cell: CellId, add: bool },
    /// Camp on `cell`: listen to its BCCH and PCH
    SelectCell { cell: CellId },
    /// Begin (or restart) searching for cells
    StartCellSearch,
    SendOnBearer { rb: RbId, data: Bytes },
}

impl fmt::Display for LowerLayerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowerLayerCommand::ConfigureChannel { channel } => write!(f, "configure {channel:?}"),
            LowerLayerCommand::ReleaseChannel { channel } => write!(f, "release {channel:?}"),
            LowerLayerCommand::ConfigureRadioBearer { rb, mode, channel } => {
                write!(f, "configure RB{rb} {mode:?} on {channel:?}")
            }
            LowerLayerCommand::ReleaseRadioBearer { rb } => write!(f, "release RB{rb}"),
            LowerLayerCommand::ConfigureDownlink { cell, add } => {
                write!(f, "{} radio link cell {cell}", if *add { "add" } else { "remove" })
            }
            LowerLayerCommand::SelectCell { cell } => write!(f, "select cell {cell}"),
            LowerLayerCommand::StartCellSearch => write!(f, "start cell search"),
            LowerLayerCommand::SendOnBearer { rb, data } => write!(f, "send {} bytes on RB{rb}", data.len()),
        }
    }
}
