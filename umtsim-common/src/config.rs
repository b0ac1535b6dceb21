//! Configuration structures for the UE stack.
//!
//! Every field carries a serde default so a minimal YAML document (just the
//! IMSI) is a complete configuration. Numeric radio parameters have a valid
//! range; [`UeConfig::normalize`] replaces out-of-range values with their
//! defaults and logs a warning for each one.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{Imsi, PlmnId};

/// Default minimum RX level for cell selection (dBm).
pub const DEFAULT_Q_RXLEV_MIN: f64 = -95.0;
/// Valid range of the minimum RX level (dBm).
pub const Q_RXLEV_MIN_RANGE: (f64, f64) = (-115.0, -80.0);
/// Default cell search threshold (dBm).
pub const DEFAULT_S_SEARCH: f64 = -80.0;
/// Valid range of the cell search threshold (dBm).
pub const S_SEARCH_RANGE: (f64, f64) = (-105.0, -70.0);
/// Default cell reselection hysteresis (dB).
pub const DEFAULT_Q_HYST: f64 = 4.0;
/// Valid range of the cell reselection hysteresis (dB).
pub const Q_HYST_RANGE: (f64, f64) = (0.0, 40.0);
/// Default cell evaluation time (ms).
pub const DEFAULT_CELL_EVAL_TIME_MS: u64 = 3000;
/// Default soft handover active set threshold (dB below the best cell).
pub const DEFAULT_AS_THRESHOLD: f64 = 3.0;
/// Default hysteresis of the active set threshold (dB).
pub const DEFAULT_AS_THRESHOLD_HYST: f64 = 1.0;
/// Default replacement hysteresis (dB).
pub const DEFAULT_AS_REPLACE_HYST: f64 = 1.0;
/// Maximum active set size.
pub const MAX_ACTIVE_SET: usize = 6;
/// Default measurement averaging window (ms).
pub const DEFAULT_MEAS_WINDOW_MS: u64 = 2000;
/// Age after which a cell without fresh samples is dropped (ms).
pub const DEFAULT_MEAS_OBSOLETE_MS: u64 = 10_000;

/// Attach type requested by GMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachMode {
    /// GPRS attach only
    #[default]
    GprsOnly,
    /// Combined GPRS/IMSI attach
    Combined,
}

/// RRC idle mode and soft handover parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RrcParams {
    /// Minimum averaged CPICH RSCP for a cell to be suitable (dBm)
    pub q_rxlev_min: f64,
    /// Reselection hysteresis added to the serving cell level (dB)
    pub q_hyst: f64,
    /// Serving level below which neighbour cells are evaluated (dBm)
    pub s_search: f64,
    /// Reselection evaluation period (ms)
    pub cell_eval_time_ms: u64,
    /// Active set reporting range below the best cell (dB)
    pub as_threshold: f64,
    /// Hysteresis applied to `as_threshold` (dB)
    pub as_threshold_hyst: f64,
    /// Replacement hysteresis (dB)
    pub as_replace_hyst: f64,
    /// Maximum number of cells in the active set
    pub as_size_max: usize,
}

impl Default for RrcParams {
    fn default() -> Self {
        Self {
            q_rxlev_min: DEFAULT_Q_RXLEV_MIN,
            q_hyst: DEFAULT_Q_HYST,
            s_search: DEFAULT_S_SEARCH,
            cell_eval_time_ms: DEFAULT_CELL_EVAL_TIME_MS,
            as_threshold: DEFAULT_AS_THRESHOLD,
            as_threshold_hyst: DEFAULT_AS_THRESHOLD_HYST,
            as_replace_hyst: DEFAULT_AS_REPLACE_HYST,
            as_size_max: 3,
        }
    }
}

impl RrcParams {
    /// Cell evaluation period as a duration.
    pub fn cell_eval_time(&self) -> Duration {
        Duration::from_millis(self.cell_eval_time_ms)
    }

    fn normalize(&mut self, warnings: &mut Vec<String>) {
        clamp_or_default(&mut self.q_rxlev_min, Q_RXLEV_MIN_RANGE, DEFAULT_Q_RXLEV_MIN, "q_rxlev_min", warnings);
        clamp_or_default(&mut self.s_search, S_SEARCH_RANGE, DEFAULT_S_SEARCH, "s_search", warnings);
        clamp_or_default(&mut self.q_hyst, Q_HYST_RANGE, DEFAULT_Q_HYST, "q_hyst", warnings);
        if self.cell_eval_time_ms == 0 {
            warnings.push(format!(
                "cell_eval_time_ms must be positive, using {DEFAULT_CELL_EVAL_TIME_MS}"
            ));
            self.cell_eval_time_ms = DEFAULT_CELL_EVAL_TIME_MS;
        }
        if self.as_size_max == 0 || self.as_size_max > MAX_ACTIVE_SET {
            warnings.push(format!(
                "as_size_max {} outside 1..={MAX_ACTIVE_SET}, using 3",
                self.as_size_max
            ));
            self.as_size_max = 3;
        }
    }
}

fn clamp_or_default(value: &mut f64, range: (f64, f64), default: f64, name: &str, warnings: &mut Vec<String>) {
    if !(range.0..=range.1).contains(value) {
        warnings.push(format!(
            "{name} {value} outside [{}, {}], using default {default}",
            range.0, range.1
        ));
        *value = default;
    }
}

/// Measurement smoothing and staleness parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MeasurementParams {
    /// Sliding window length for averaging (ms)
    pub window_ms: u64,
    /// A cell whose newest sample is older than this is evicted (ms)
    pub obsolete_after_ms: u64,
    /// Period of the staleness sweep (ms)
    pub check_interval_ms: u64,
    /// Period of the connected mode report check (ms)
    pub report_check_interval_ms: u64,
}

impl Default for MeasurementParams {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_MEAS_WINDOW_MS,
            obsolete_after_ms: DEFAULT_MEAS_OBSOLETE_MS,
            check_interval_ms: 5000,
            report_check_interval_ms: 5000,
        }
    }
}

/// Overrides for NAS guard timers, in milliseconds. Unset entries use the
/// 3GPP defaults compiled into the UE crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NasTimerOverrides {
    /// Periodic location update
    pub t3212_ms: Option<u64>,
    /// Periodic routing area update
    pub t3312_ms: Option<u64>,
    /// MM wait for network command
    pub t3240_ms: Option<u64>,
    /// CC setup guard
    pub t303_ms: Option<u64>,
    /// SM activation guard
    pub t3380_ms: Option<u64>,
}

/// Application flow parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FlowParams {
    /// Per-flow packet buffer capacity
    pub buffer_capacity: usize,
    /// Inactivity after which an active PDP context is deactivated (ms)
    pub ps_idle_time_ms: u64,
    /// Period of the flow sweep (ms)
    pub sweep_interval_ms: u64,
    /// Time a rejected context is kept before it is purged (ms)
    pub rejected_purge_ms: u64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            buffer_capacity: 64,
            ps_idle_time_ms: 45_000,
            sweep_interval_ms: 10_000,
            rejected_purge_ms: 30_000,
        }
    }
}

/// UE configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UeConfig {
    /// Subscriber identity
    pub imsi: Imsi,
    /// Home PLMN
    pub home_plmn: PlmnId,
    /// Temporary identity stored from a previous session
    pub tmsi: Option<u32>,
    /// Attach type used by GMM
    pub attach_mode: AttachMode,
    /// Attach to the PS domain at power on instead of on first packet
    pub attach_on_power_on: bool,
    /// RRC parameters
    pub rrc: RrcParams,
    /// Measurement parameters
    pub measurement: MeasurementParams,
    /// NAS timer overrides
    pub timers: NasTimerOverrides,
    /// Flow parameters
    pub flows: FlowParams,
}

impl Default for UeConfig {
    fn default() -> Self {
        Self {
            imsi: Imsi::new("001010000000001"),
            home_plmn: PlmnId::new(1, 1),
            tmsi: None,
            attach_mode: AttachMode::default(),
            attach_on_power_on: false,
            rrc: RrcParams::default(),
            measurement: MeasurementParams::default(),
            timers: NasTimerOverrides::default(),
            flows: FlowParams::default(),
        }
    }
}

impl UeConfig {
    /// Parses a UE configuration from a YAML string.
    ///
    /// ```
    /// use umtsim_common::UeConfig;
    ///
    /// let config = UeConfig::from_yaml("imsi: \"001010000000042\"\n").unwrap();
    /// assert_eq!(config.imsi.0, "001010000000042");
    /// assert_eq!(config.rrc.q_rxlev_min, -95.0);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads a UE configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Serializes the configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Replaces out-of-range parameters with defaults, logging one warning
    /// per replaced value. Returns the warnings.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        self.rrc.normalize(&mut warnings);
        if self.measurement.window_ms == 0 {
            warnings.push(format!("measurement.window_ms must be positive, using {DEFAULT_MEAS_WINDOW_MS}"));
            self.measurement.window_ms = DEFAULT_MEAS_WINDOW_MS;
        }
        if self.flows.buffer_capacity == 0 {
            warnings.push("flows.buffer_capacity must be positive, using 64".to_string());
            self.flows.buffer_capacity = 64;
        }
        for w in &warnings {
            tracing::warn!("config: {}", w);
        }
        warnings
    }
}
