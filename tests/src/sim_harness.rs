//! Discrete-event harness around one UE and the mock network
//!
//! [`SimHarness`] owns a [`UeLayer3`] and a [`MockNetwork`] and plays the
//! part of the physical layer between them: PDUs the UE sends are handed to
//! the network, the network's answers are delivered back, and every audible
//! cell is measured once per [`MEASUREMENT_PERIOD`]. The clock only moves
//! in [`SimHarness::run_until`] and [`SimHarness::run_for`].

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;
use umtsim_common::{CellId, SimTime, UeConfig};
use umtsim_l3::{L3Message, NasPdu, RrcMessage};
use umtsim_ue::lower::RB_BCCH;
use umtsim_ue::{AppIndication, LowerLayerCommand, MetricKind, RbId, UeLayer3};

use crate::mock_network::MockNetwork;
use crate::test_fixtures::TestCell;

/// Interval between two measurements of an audible cell.
pub const MEASUREMENT_PERIOD: Duration = Duration::from_secs(1);

/// Rounds of command exchange after which the harness assumes a loop.
const MAX_EXCHANGE_ROUNDS: usize = 64;

/// One UE attached to the mock network.
pub struct SimHarness {
    pub ue: UeLayer3,
    pub net: MockNetwork,
    /// Cells the UE currently hears
    radio: BTreeMap<CellId, TestCell>,
    next_measurement: SimTime,
    commands: Vec<(SimTime, LowerLayerCommand)>,
    indications: Vec<(SimTime, AppIndication)>,
}

impl SimHarness {
    /// Powered-on UE with no cell in range.
    pub fn new(config: UeConfig) -> Self {
        Self::with_network(config, MockNetwork::new())
    }

    pub fn with_network(config: UeConfig, net: MockNetwork) -> Self {
        let mut harness = Self {
            ue: UeLayer3::new(config),
            net,
            radio: BTreeMap::new(),
            next_measurement: SimTime::ZERO,
            commands: Vec::new(),
            indications: Vec::new(),
        };
        harness.ue.power_on();
        harness.exchange();
        harness
    }

    /// Harness whose UE is camped on `cell` and has finished its power-on
    /// registration.
    pub fn camped_on(config: UeConfig, cell: TestCell) -> Self {
        let mut harness = Self::new(config);
        harness.add_cell(cell);
        harness.exchange();
        harness
    }

    pub fn now(&self) -> SimTime {
        self.ue.now()
    }

    /// Every command the UE issued so far, with its time.
    pub fn commands(&self) -> &[(SimTime, LowerLayerCommand)] {
        &self.commands
    }

    /// Indications delivered to the application so far.
    pub fn indications(&self) -> Vec<AppIndication> {
        self.indications.iter().map(|(_, ind)| ind.clone()).collect()
    }

    /// Removes and returns the indications collected so far.
    pub fn take_indications(&mut self) -> Vec<AppIndication> {
        std::mem::take(&mut self.indications).into_iter().map(|(_, ind)| ind).collect()
    }

    // ========================================================================
    // Radio environment
    // ========================================================================

    /// Brings `cell` into range and measures it at once.
    pub fn add_cell(&mut self, cell: TestCell) {
        self.radio.insert(cell.id, cell);
        self.measure(cell);
    }

    /// Takes `cell` out of range; it is no longer measured.
    pub fn remove_cell(&mut self, cell: CellId) {
        self.radio.remove(&cell);
    }

    fn measure(&mut self, cell: TestCell) {
        self.ue.measurement_indication(cell.id, MetricKind::Rscp, cell.rscp);
        // the BCCH is read whenever the UE selected the cell without camping
        let rrc = self.ue.rrc();
        if rrc.state().is_idle() && !rrc.state().is_camped() && rrc.primary_cell() == Some(cell.id) {
            for block in cell.system_information() {
                let msg = RrcMessage::SystemInformation { cell_id: cell.id, block };
                self.ue.receive_on_bearer(RB_BCCH, msg.encode(0));
            }
        }
    }

    fn measure_all(&mut self) {
        let cells: Vec<TestCell> = self.radio.values().copied().collect();
        for cell in cells {
            self.measure(cell);
        }
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// Runs the UE and the network until `end`, stopping at every timer
    /// deadline and measurement instant on the way.
    pub fn run_until(&mut self, end: SimTime) {
        loop {
            let mut next = self.next_measurement.min(end);
            if let Some(deadline) = self.ue.next_deadline() {
                next = next.min(deadline);
            }
            let next = next.max(self.now());
            self.ue.advance_to(next);
            self.exchange();
            if next >= self.next_measurement {
                self.next_measurement = next.after(MEASUREMENT_PERIOD);
                self.measure_all();
                self.exchange();
            }
            if next >= end {
                break;
            }
        }
    }

    pub fn run_for(&mut self, duration: Duration) {
        let end = self.now().after(duration);
        self.run_until(end);
    }

    // ========================================================================
    // PDU exchange
    // ========================================================================

    /// Passes the UE's commands to the network and the answers back until
    /// neither side has anything left to send.
    pub fn exchange(&mut self) {
        for _ in 0..MAX_EXCHANGE_ROUNDS {
            self.collect_indications();
            let commands = self.ue.take_lower_commands();
            if commands.is_empty() {
                return;
            }
            let now = self.now();
            let mut downlink = Vec::new();
            for cmd in commands {
                trace!("[{}] {}", now, cmd);
                downlink.extend(self.net.handle_command(&cmd));
                self.commands.push((now, cmd));
            }
            self.deliver(downlink);
        }
        panic!("UE and network still exchanging after {MAX_EXCHANGE_ROUNDS} rounds");
    }

    fn deliver(&mut self, pdus: Vec<(RbId, Bytes)>) {
        for (rb, data) in pdus {
            self.ue.receive_on_bearer(rb, data);
        }
    }

    fn collect_indications(&mut self) {
        let now = self.now();
        for ind in self.ue.take_app_indications() {
            self.indications.push((now, ind));
        }
    }

    /// Delivers PDUs produced by the network outside a UE exchange.
    pub fn deliver_downlink(&mut self, pdus: Vec<(RbId, Bytes)>) {
        self.deliver(pdus);
        self.exchange();
    }

    /// Sends a NAS message from the network on the current connection.
    pub fn network_nas(&mut self, pdu: NasPdu) {
        let pdus = self.net.downlink_nas(&pdu);
        self.deliver_downlink(pdus);
    }

    /// Pages the UE for an incoming call.
    pub fn incoming_call(&mut self, peer: u32, app_id: u32) {
        let ue_id = self.ue.rrc().ue_id();
        let paging = self.net.page_for_call(ue_id, peer, app_id);
        self.deliver_downlink(vec![paging]);
    }

    // ========================================================================
    // Command log queries
    // ========================================================================

    /// Number of logged commands matching `pred`.
    pub fn count_commands(&self, pred: impl Fn(&LowerLayerCommand) -> bool) -> usize {
        self.commands.iter().filter(|(_, cmd)| pred(cmd)).count()
    }

    /// Time of the first logged command matching `pred`.
    pub fn first_command_time(&self, pred: impl Fn(&LowerLayerCommand) -> bool) -> Option<SimTime> {
        self.commands.iter().find(|(_, cmd)| pred(cmd)).map(|(t, _)| *t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::home_cell;
    use umtsim_ue::{IdleSubstate, RrcState};

    #[test]
    fn test_camping_needs_a_cell() {
        let mut h = SimHarness::new(UeConfig::default());
        h.run_for(Duration::from_secs(5));
        assert_eq!(h.ue.rrc().state(), RrcState::Idle(IdleSubstate::NoPlmn));
        assert_eq!(h.net.connection_requests(), 0);
    }

    #[test]
    fn test_clock_reaches_end() {
        let mut h = SimHarness::camped_on(UeConfig::default(), home_cell());
        h.run_until(SimTime::from_millis(2500));
        assert_eq!(h.now(), SimTime::from_millis(2500));
    }
}
