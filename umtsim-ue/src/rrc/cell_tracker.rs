//! Cell & Measurement Tracker
//!
//! Keeps one [`CellRecord`] per cell heard by the physical layer, in arrival
//! order, with smoothed RSCP and Ec/No levels and the system information
//! read from the cell's broadcast channel.
//!
//! # Cell Sets
//!
//! Every record belongs to exactly one of three sets:
//! - **Detected**: heard, not reported to the network
//! - **Monitored**: reported in measurement reports while connected
//! - **Active**: part of the soft handover active set (CELL_DCH only)
//!
//! # Primary Cell
//!
//! The primary (serving/camped) cell is stored as a cell id, not a
//! reference. Evicting the primary record clears it and the caller must pick
//! a new one.

use std::time::Duration;

use umtsim_common::{CellId, RegAreaId, SimTime};
use umtsim_l3::{CellMeasurement, SibType, SystemInformationBlock};

use super::measurement::MeasurementWindow;
use crate::lower::MetricKind;

/// Blocks that must be read before the UE may camp normally.
const REQUIRED_SIBS: [SibType; 3] = [SibType::Master, SibType::Type1, SibType::Type3];

/// Set membership of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellSet {
    Detected,
    Monitored,
    Active,
}

/// One detected cell.
#[derive(Debug, Clone)]
pub struct CellRecord {
    pub id: CellId,
    /// Registration area from SIB3
    pub reg_area: Option<RegAreaId>,
    /// Value tag of the last master information block
    pub value_tag: Option<u8>,
    sib_mask: u32,
    pub rscp: MeasurementWindow,
    pub ecno: MeasurementWindow,
    pub set: CellSet,
    /// Periodic location update timer from SIB1 (deci-hours, 0 = off)
    pub t3212_deci_hours: Option<u8>,
    pub attach_allowed: bool,
}

impl CellRecord {
    fn new(id: CellId, window: Duration) -> Self {
        Self {
            id,
            reg_area: None,
            value_tag: None,
            sib_mask: 0,
            rscp: MeasurementWindow::new(window),
            ecno: MeasurementWindow::new(window),
            set: CellSet::Detected,
            t3212_deci_hours: None,
            attach_allowed: true,
        }
    }

    /// Averaged RSCP (dBm).
    pub fn level(&self) -> Option<f64> {
        self.rscp.average()
    }

    pub fn has_sib(&self, sib: SibType) -> bool {
        self.sib_mask & (1 << u8::from(sib)) != 0
    }

    fn mark_sib(&mut self, sib: SibType) {
        self.sib_mask |= 1 << u8::from(sib);
    }

    fn clear_sibs(&mut self) {
        self.sib_mask = 0;
    }

    /// True once the master block, SIB1 and SIB3 are stored.
    pub fn system_information_complete(&self) -> bool {
        REQUIRED_SIBS.iter().all(|s| self.has_sib(*s))
    }

    fn last_sample(&self) -> Option<SimTime> {
        self.rscp.last_sample().max(self.ecno.last_sample())
    }
}

/// Result of applying a system information block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SibUpdate {
    /// Unknown cell
    Ignored,
    /// Block stored
    Stored,
    /// Master block with a new value tag; stored blocks were discarded
    ValueTagChanged,
}

/// Cell list of one UE.
#[derive(Debug, Clone)]
pub struct CellTracker {
    cells: Vec<CellRecord>,
    primary: Option<CellId>,
    window: Duration,
    obsolete_after: Duration,
}

impl CellTracker {
    pub fn new(window: Duration, obsolete_after: Duration) -> Self {
        Self {
            cells: Vec::new(),
            primary: None,
            window,
            obsolete_after,
        }
    }

    /// Adds a measurement sample, creating the record for an unseen cell.
    ///
    /// Returns true if the cell was new.
    pub fn record_sample(&mut self, cell: CellId, metric: MetricKind, value: f64, now: SimTime) -> bool {
        let (record, new) = match self.cells.iter().position(|c| c.id == cell) {
            Some(i) => (&mut self.cells[i], false),
            None => {
                tracing::debug!("New cell detected: {}", cell);
                self.cells.push(CellRecord::new(cell, self.window));
                let last = self.cells.len() - 1;
                (&mut self.cells[last], true)
            }
        };
        match metric {
            MetricKind::Rscp => record.rscp.add(now, value),
            MetricKind::EcNo => record.ecno.add(now, value),
        }
        new
    }

    pub fn get(&self, cell: CellId) -> Option<&CellRecord> {
        self.cells.iter().find(|c| c.id == cell)
    }

    fn get_mut(&mut self, cell: CellId) -> Option<&mut CellRecord> {
        self.cells.iter_mut().find(|c| c.id == cell)
    }

    /// Averaged RSCP of a cell.
    pub fn level(&self, cell: CellId) -> Option<f64> {
        self.get(cell).and_then(CellRecord::level)
    }

    /// Cell with the highest averaged RSCP at or above `min_level`.
    /// On equal levels the cell detected first wins.
    pub fn best_cell(&self, min_level: f64) -> Option<CellId> {
        let mut best: Option<(CellId, f64)> = None;
        for cell in &self.cells {
            let Some(level) = cell.level() else { continue };
            if level < min_level {
                continue;
            }
            match best {
                Some((_, b)) if level <= b => {}
                _ => best = Some((cell.id, level)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Removes cells whose newest sample is older than the staleness
    /// threshold and returns their ids. Clears the primary cell if it was
    /// among them.
    pub fn evict_stale(&mut self, now: SimTime) -> Vec<CellId> {
        let limit = self.obsolete_after;
        let mut evicted = Vec::new();
        self.cells.retain(|c| {
            let stale = c.last_sample().map_or(true, |t| now.saturating_since(t) > limit);
            if stale {
                evicted.push(c.id);
            }
            !stale
        });
        if let Some(p) = self.primary {
            if evicted.contains(&p) {
                tracing::debug!("Primary cell {} evicted", p);
                self.primary = None;
            }
        }
        evicted
    }

    pub fn primary(&self) -> Option<CellId> {
        self.primary
    }

    pub fn primary_record(&self) -> Option<&CellRecord> {
        self.primary.and_then(|p| self.get(p))
    }

    /// Makes `cell` the primary cell. System information of the new primary
    /// must be read again.
    pub fn set_primary(&mut self, cell: Option<CellId>) {
        if let Some(c) = cell {
            if let Some(record) = self.get_mut(c) {
                record.clear_sibs();
                record.value_tag = None;
            }
        }
        self.primary = cell;
    }

    /// Stores a system information block broadcast by `cell`.
    pub fn apply_sib(&mut self, cell: CellId, block: &SystemInformationBlock) -> SibUpdate {
        let Some(record) = self.get_mut(cell) else {
            return SibUpdate::Ignored;
        };
        let mut result = SibUpdate::Stored;
        match block {
            SystemInformationBlock::Master { value_tag } => {
                if record.value_tag.is_some_and(|t| t != *value_tag) {
                    tracing::debug!("Cell {} value tag changed, re-reading SIBs", cell);
                    record.clear_sibs();
                    result = SibUpdate::ValueTagChanged;
                }
                record.value_tag = Some(*value_tag);
            }
            SystemInformationBlock::Sib1 { t3212_deci_hours, attach_allowed } => {
                record.t3212_deci_hours = Some(*t3212_deci_hours);
                record.attach_allowed = *attach_allowed;
            }
            SystemInformationBlock::Sib3 { reg_area, .. } => {
                record.reg_area = Some(*reg_area);
            }
            SystemInformationBlock::Sib5
            | SystemInformationBlock::Sib7
            | SystemInformationBlock::Other(_) => {}
        }
        record.mark_sib(block.sib_type());
        result
    }

    /// Moves a cell to another set. Returns false for an unknown cell.
    pub fn set_membership(&mut self, cell: CellId, set: CellSet) -> bool {
        match self.get_mut(cell) {
            Some(record) => {
                record.set = set;
                true
            }
            None => false,
        }
    }

    /// Cells in the active set, in arrival order.
    pub fn active_set(&self) -> Vec<CellId> {
        self.in_set(CellSet::Active)
    }

    pub fn in_set(&self, set: CellSet) -> Vec<CellId> {
        self.cells.iter().filter(|c| c.set == set).map(|c| c.id).collect()
    }

    /// Moves every cell of `from` into `to`.
    pub fn move_all(&mut self, from: CellSet, to: CellSet) {
        for c in self.cells.iter_mut().filter(|c| c.set == from) {
            c.set = to;
        }
    }

    /// Averaged RSCP of every cell with samples, for a measurement report.
    pub fn measurements(&self) -> Vec<CellMeasurement> {
        self.cells
            .iter()
            .filter_map(|c| c.level().map(|rscp_dbm| CellMeasurement { cell_id: c.id, rscp_dbm }))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellRecord> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
