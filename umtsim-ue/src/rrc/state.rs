//! RRC State Machine
//!
//! UE RRC states as defined in 3GPP TS 25.331 and the idle mode sub-states of
//! TS 25.304.
//!
//! # RRC States
//!
//! - **Idle**: no signalling connection. The UE searches for a PLMN, selects
//!   a suitable cell, reads its system information and camps on it.
//! - **Connected**: a signalling connection exists. Only CELL_DCH carries
//!   dedicated radio bearers in this stack; CELL_FACH, CELL_PCH and URA_PCH
//!   are modelled as states but never entered by network command.
//!
//! # State Transitions
//!
//! | From | To | Trigger |
//! |------|----|---------|
//! | Idle.NoPlmn | Idle.PlmnSelected | suitable cell found |
//! | Idle.PlmnSelected | Idle.SuitableCellSelected | master information block read |
//! | Idle.SuitableCellSelected | Idle.CampedNormally | SIB1 and SIB3 read |
//! | Idle.CampedNormally | Connected.CellDch | RRC CONNECTION SETUP |
//! | Connected.* | Idle.CampedNormally | release or link failure |
//! | any | Idle.NoPlmn | every cell lost |

use std::fmt;

use thiserror::Error;

/// Idle mode sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdleSubstate {
    /// Searching for a PLMN
    #[default]
    NoPlmn,
    /// Best suitable cell chosen, waiting for its broadcast channel
    PlmnSelected,
    /// Master information block read
    SuitableCellSelected,
    /// System information complete, paging monitored
    CampedNormally,
}

/// Connected mode sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectedSubstate {
    CellDch,
    CellFach,
    CellPch,
    UraPch,
}

/// RRC state of the UE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RrcState {
    Idle(IdleSubstate),
    Connected(ConnectedSubstate),
}

impl Default for RrcState {
    fn default() -> Self {
        RrcState::Idle(IdleSubstate::NoPlmn)
    }
}

impl RrcState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RrcState::Idle(_))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, RrcState::Connected(_))
    }

    /// Camped normally: paging is monitored and a connection may be requested.
    pub fn is_camped(&self) -> bool {
        matches!(self, RrcState::Idle(IdleSubstate::CampedNormally))
    }

    /// Returns true if the UE should run cell (re)selection.
    pub fn should_perform_cell_selection(&self) -> bool {
        self.is_idle()
    }

    /// Validates a transition.
    ///
    /// Connected mode may only be entered from `CampedNormally`, and a
    /// connected UE leaves it only through idle mode.
    pub fn check_transition(&self, to: RrcState) -> Result<(), StateError> {
        let valid = match (self, to) {
            (RrcState::Idle(IdleSubstate::CampedNormally), RrcState::Connected(_)) => true,
            (RrcState::Idle(_), RrcState::Connected(_)) => false,
            (RrcState::Connected(_), RrcState::Connected(_)) => true,
            (_, RrcState::Idle(_)) => true,
        };
        if valid {
            Ok(())
        } else {
            Err(StateError::InvalidTransition {
                layer: "RRC",
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for IdleSubstate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleSubstate::NoPlmn => write!(f, "NO_PLMN"),
            IdleSubstate::PlmnSelected => write!(f, "PLMN_SELECTED"),
            IdleSubstate::SuitableCellSelected => write!(f, "SUITABLE_CELL_SELECTED"),
            IdleSubstate::CampedNormally => write!(f, "CAMPED_NORMALLY"),
        }
    }
}

impl fmt::Display for ConnectedSubstate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectedSubstate::CellDch => write!(f, "CELL_DCH"),
            ConnectedSubstate::CellFach => write!(f, "CELL_FACH"),
            ConnectedSubstate::CellPch => write!(f, "CELL_PCH"),
            ConnectedSubstate::UraPch => write!(f, "URA_PCH"),
        }
    }
}

impl fmt::Display for RrcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RrcState::Idle(s) => write!(f, "RRC_IDLE.{s}"),
            RrcState::Connected(s) => write!(f, "RRC_CONNECTED.{s}"),
        }
    }
}

/// Invalid state machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid {layer} transition from {from} to {to}")]
    InvalidTransition {
        layer: &'static str,
        from: String,
        to: String,
    },
}
