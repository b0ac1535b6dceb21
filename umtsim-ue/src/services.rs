//! Shared services of one UE
//!
//! Every sublayer handler receives a `&mut UeServices`: the timer core (which
//! also owns the simulation clock), the outboxes toward the lower layer and
//! the application, the statistics, and the queue of internal indications
//! travelling upward between sublayers.
//!
//! Indications are queued rather than delivered by direct calls so that a
//! handler never re-enters another sublayer while it holds a mutable borrow;
//! the UE context drains the queue after every external event.

use std::collections::VecDeque;

use bytes::Bytes;
use umtsim_common::{CellId, CnDomain, RegAreaId, SimTime};
use umtsim_l3::PagingCause;

use crate::app::AppIndication;
use crate::lower::{LowerLayerCommand, RbId};
use crate::nas::{MmConnFailure, MmConnKey};
use crate::stats::UeStats;
use crate::timer::{PeriodicInterval, TimerCore};

/// Internal upward event between sublayers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indication {
    /// RRC camped normally on `cell` with complete system information
    CellCamped {
        cell: CellId,
        area: RegAreaId,
        /// Broadcast periodic location update timer
        t3212: Option<PeriodicInterval>,
        attach_allowed: bool,
    },
    /// Every cell was lost
    NoCellAvailable,
    /// The signalling connection requested for `domain` is up
    RrcEstablished { domain: CnDomain },
    /// Connection establishment for `domain` failed
    RrcEstablishFailed { domain: CnDomain },
    /// The signalling connection of `domain` is gone
    SignallingReleased { domain: CnDomain },
    /// NAS message received in a downlink direct transfer
    NasReceived { domain: CnDomain, data: Bytes },
    /// Paging addressed to this UE
    Paged { domain: CnDomain, cause: PagingCause },
    RabEstablished { rab_id: u8, rb: RbId, domain: CnDomain },
    RabReleased { rab_id: u8 },
    /// MM connection granted to a CC transaction
    MmConnectionActive { key: MmConnKey },
    /// MM connection could not be established
    MmConnectionFailed { key: MmConnKey, failure: MmConnFailure },
    /// Combined attach also registered the UE in the CS domain
    CombinedAttachAccepted { area: RegAreaId },
    /// GMM holds a PS signalling connection usable by SM
    PsSignallingReady,
    /// GMM gave up obtaining a PS signalling connection
    PsSignallingFailed,
    /// GMM is deregistered; every PS context is gone
    PsDetached,
}

/// Timers, outboxes and counters shared by the sublayers of one UE.
#[derive(Debug, Default)]
pub struct UeServices {
    pub timers: TimerCore,
    pub stats: UeStats,
    lower: Vec<LowerLayerCommand>,
    app: Vec<AppIndication>,
    indications: VecDeque<Indication>,
}

impl UeServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.timers.now()
    }

    /// Queues a command toward the lower layer.
    pub fn push_lower(&mut self, cmd: LowerLayerCommand) {
        tracing::trace!("lower: {}", cmd);
        self.lower.push(cmd);
    }

    /// Queues a notification toward the application.
    pub fn push_app(&mut self, ind: AppIndication) {
        tracing::debug!("app: {:?}", ind);
        self.app.push(ind);
    }

    /// Queues an internal indication.
    pub fn indicate(&mut self, ind: Indication) {
        self.indications.push_back(ind);
    }

    pub(crate) fn next_indication(&mut self) -> Option<Indication> {
        self.indications.pop_front()
    }

    pub fn take_lower_commands(&mut self) -> Vec<LowerLayerCommand> {
        std::mem::take(&mut self.lower)
    }

    pub fn take_app_indications(&mut self) -> Vec<AppIndication> {
        std::mem::take(&mut self.app)
    }

    /// Commands queued but not yet taken.
    pub fn lower_commands(&self) -> &[LowerLayerCommand] {
        &self.lower
    }

    /// Internal indications queued but not yet drained.
    pub fn pending_indications(&self) -> impl Iterator<Item = &Indication> {
        self.indications.iter()
    }
}
