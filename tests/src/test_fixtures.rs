//! Test fixtures and configuration helpers
//!
//! Pre-configured cells, UE configurations and traffic descriptors.

use bytes::Bytes;
use umtsim_common::{CellId, FlowClassifier, Imsi, PlmnId, RegAreaId, UeConfig};
use umtsim_l3::SystemInformationBlock;

/// Home PLMN of every fixture.
pub const TEST_PLMN: PlmnId = PlmnId::new(1, 1);

/// Broadcast parameters of a simulated cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestCell {
    pub id: CellId,
    pub area: RegAreaId,
    /// Received level reported while the cell is audible (dBm)
    pub rscp: f64,
    pub t3212_deci_hours: u8,
    pub attach_allowed: bool,
}

impl TestCell {
    pub fn new(id: CellId, lac: u16) -> Self {
        Self {
            id,
            area: RegAreaId::new(TEST_PLMN, lac, 1),
            rscp: -70.0,
            t3212_deci_hours: 0,
            attach_allowed: true,
        }
    }

    pub fn with_rscp(mut self, rscp: f64) -> Self {
        self.rscp = rscp;
        self
    }

    /// Blocks needed to camp normally.
    pub fn system_information(&self) -> [SystemInformationBlock; 3] {
        [
            SystemInformationBlock::Master { value_tag: 1 },
            SystemInformationBlock::Sib1 {
                t3212_deci_hours: self.t3212_deci_hours,
                attach_allowed: self.attach_allowed,
            },
            SystemInformationBlock::Sib3 { reg_area: self.area, q_rxlev_min: -58 },
        ]
    }
}

/// The cell most scenarios camp on.
pub fn home_cell() -> TestCell {
    TestCell::new(1, 0x10)
}

/// A neighbour in a different location area.
pub fn neighbour_cell() -> TestCell {
    TestCell::new(2, 0x20)
}

/// Test UE configuration builder
#[derive(Debug, Clone, Default)]
pub struct TestUeConfig {
    config: UeConfig,
}

impl TestUeConfig {
    pub fn with_imsi(mut self, imsi: &str) -> Self {
        self.config.imsi = Imsi::new(imsi);
        self
    }

    /// Shortens the CC setup guard.
    pub fn with_t303_ms(mut self, ms: u64) -> Self {
        self.config.timers.t303_ms = Some(ms);
        self
    }

    pub fn with_t3240_ms(mut self, ms: u64) -> Self {
        self.config.timers.t3240_ms = Some(ms);
        self
    }

    pub fn with_ps_idle_time_ms(mut self, ms: u64) -> Self {
        self.config.flows.ps_idle_time_ms = ms;
        self
    }

    pub fn attach_on_power_on(mut self) -> Self {
        self.config.attach_on_power_on = true;
        self
    }

    pub fn build(self) -> UeConfig {
        self.config
    }
}

/// Uplink UDP flow from the UE to a server.
pub fn udp_flow(dst_port: u16) -> FlowClassifier {
    FlowClassifier::new(0x0A00_0001, 0xC0A8_0001, 40_000, dst_port, 17)
}

/// Numbered test payload; the sequence number leads the packet.
pub fn packet(seq: u32) -> Bytes {
    let mut data = seq.to_be_bytes().to_vec();
    data.extend_from_slice(b"payload");
    Bytes::from(data)
}

/// Sequence number of a [`packet`].
pub fn packet_seq(data: &Bytes) -> Option<u32> {
    let head: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_sequence_number() {
        assert_eq!(packet_seq(&packet(7)), Some(7));
        assert_eq!(packet_seq(&Bytes::from_static(b"ab")), None);
    }

    #[test]
    fn test_cells_in_distinct_location_areas() {
        assert!(!home_cell().area.same_location_area(&neighbour_cell().area));
    }

    #[test]
    fn test_config_builder() {
        let config = TestUeConfig::default().with_t303_ms(5000).with_imsi("001010000000077").build();
        assert_eq!(config.timers.t303_ms, Some(5000));
        assert_eq!(config.imsi.0, "001010000000077");
    }
}
