//! umtsim UE scenario runner
//!
//! Drives one UE through a scripted radio scenario with no network
//! responder attached: measurements and system information are injected at
//! their scheduled times, application actions are applied, and every
//! command the stack issues toward the radio layers is traced. The
//! statistics are printed as YAML at the end of the run.
//!
//! # Usage
//!
//! ```bash
//! umtsim-ue -c config/ue.yaml -s scenario.yaml
//! umtsim-ue -c config/ue.yaml -s scenario.yaml -d 120000 -l debug
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use serde::Deserialize;
use tracing::{error, info, trace};

use umtsim_common::{init_logging, FlowClassifier, Imsi, LogLevel, PlmnId, RegAreaId, SimTime};
use umtsim_l3::{L3Message, RrcMessage, SystemInformationBlock};
use umtsim_ue::app::load_and_validate_ue_config;
use umtsim_ue::lower::RB_BCCH;
use umtsim_ue::{CallParams, MetricKind, UeLayer3};

/// umtsim UE - UMTS Layer-3 scenario runner
#[derive(Parser, Debug)]
#[command(name = "umtsim-ue")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the UE configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: PathBuf,

    /// Path to the radio scenario file (YAML)
    #[arg(short = 's', long = "scenario", value_name = "FILE")]
    scenario_file: PathBuf,

    /// Use this IMSI instead of the one in the config file
    #[arg(short = 'i', long = "imsi", value_name = "IMSI")]
    imsi: Option<String>,

    /// Override the scenario duration in milliseconds
    #[arg(short = 'd', long = "duration", value_name = "MS")]
    duration_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    log_level: LogLevel,
}

/// Broadcast parameters of a simulated cell.
#[derive(Debug, Clone, Deserialize)]
struct CellSpec {
    cell: u32,
    #[serde(default = "default_mcc")]
    mcc: u16,
    #[serde(default = "default_mnc")]
    mnc: u16,
    lac: u16,
    #[serde(default)]
    rac: u8,
    #[serde(default)]
    t3212_deci_hours: u8,
    #[serde(default = "default_true")]
    attach_allowed: bool,
}

fn default_mcc() -> u16 {
    1
}

fn default_mnc() -> u16 {
    1
}

fn default_true() -> bool {
    true
}

/// One scheduled scenario event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScenarioEvent {
    /// CPICH RSCP sample of a cell
    Measurement { cell: u32, rscp: f64 },
    StartCall {
        peer: u32,
        app_id: u32,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    EndCall { app_id: u32 },
    AnswerCall { app_id: u32 },
    SendPacket {
        dst_addr: u32,
        dst_port: u16,
        #[serde(default = "default_src_port")]
        src_port: u16,
        #[serde(default = "default_size")]
        size: usize,
    },
    Detach,
    PowerOff,
}

fn default_src_port() -> u16 {
    40_000
}

fn default_size() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
struct TimedEvent {
    at_ms: u64,
    #[serde(flatten)]
    event: ScenarioEvent,
}

#[derive(Debug, Clone, Deserialize)]
struct Scenario {
    duration_ms: u64,
    #[serde(default)]
    cells: Vec<CellSpec>,
    #[serde(default)]
    events: Vec<TimedEvent>,
}

fn parse_scenario(yaml: &str) -> Result<Scenario> {
    let mut scenario: Scenario = serde_yaml::from_str(yaml)?;
    scenario.events.sort_by_key(|e| e.at_ms);
    Ok(scenario)
}

fn load_scenario(path: &PathBuf) -> Result<Scenario> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&contents).with_context(|| format!("Failed to parse scenario file {}", path.display()))
}

/// Broadcasts the system information of `spec` on the BCCH.
fn broadcast_system_information(ue: &mut UeLayer3, spec: &CellSpec) {
    let reg_area = RegAreaId::new(PlmnId::new(spec.mcc, spec.mnc), spec.lac, spec.rac);
    let blocks = [
        SystemInformationBlock::Master { value_tag: 1 },
        SystemInformationBlock::Sib1 { t3212_deci_hours: spec.t3212_deci_hours, attach_allowed: spec.attach_allowed },
        SystemInformationBlock::Sib3 { reg_area, q_rxlev_min: -58 },
    ];
    for block in blocks {
        let msg = RrcMessage::SystemInformation { cell_id: spec.cell, block };
        ue.receive_on_bearer(RB_BCCH, msg.encode(0));
    }
}

fn apply_event(ue: &mut UeLayer3, scenario: &Scenario, event: &ScenarioEvent, next_packet_id: &mut u32) {
    match *event {
        ScenarioEvent::Measurement { cell, rscp } => {
            ue.measurement_indication(cell, MetricKind::Rscp, rscp);
            if let Some(spec) = scenario.cells.iter().find(|c| c.cell == cell) {
                broadcast_system_information(ue, spec);
            }
        }
        ScenarioEvent::StartCall { peer, app_id, duration_ms } => {
            let params = CallParams { duration: duration_ms.map(Duration::from_millis) };
            if let Err(cause) = ue.start_call(peer, app_id, params) {
                info!("Call from app {} refused: {}", app_id, cause);
            }
        }
        ScenarioEvent::EndCall { app_id } => ue.end_call(app_id),
        ScenarioEvent::AnswerCall { app_id } => ue.call_answered(app_id),
        ScenarioEvent::SendPacket { dst_addr, dst_port, src_port, size } => {
            let classifier = FlowClassifier::new(0x0A00_0001, dst_addr, src_port, dst_port, 17);
            let mut payload = vec![0u8; size];
            for (i, b) in next_packet_id.to_be_bytes().iter().enumerate().take(size) {
                payload[i] = *b;
            }
            *next_packet_id = next_packet_id.wrapping_add(1);
            ue.submit_ps_payload(classifier, Bytes::from(payload), None);
        }
        ScenarioEvent::Detach => ue.detach(),
        ScenarioEvent::PowerOff => ue.power_off(),
    }
}

fn trace_outputs(ue: &mut UeLayer3) {
    for cmd in ue.take_lower_commands() {
        info!("[{}] lower: {}", ue.now(), cmd);
    }
    for ind in ue.take_app_indications() {
        info!("[{}] app: {:?}", ue.now(), ind);
    }
}

fn run(args: Args) -> Result<()> {
    info!("Loading configuration from: {}", args.config_file.display());
    let mut config = load_and_validate_ue_config(&args.config_file)
        .with_context(|| format!("Invalid configuration {}", args.config_file.display()))?;
    if let Some(imsi) = args.imsi {
        info!("Overriding IMSI with: {}", imsi);
        config.imsi = Imsi::new(imsi);
    }
    let scenario = load_scenario(&args.scenario_file)?;
    let end = SimTime::from_millis(args.duration_ms.unwrap_or(scenario.duration_ms));
    info!("IMSI {}, {} cells, {} events, running until {}", config.imsi, scenario.cells.len(), scenario.events.len(), end);

    let mut ue = UeLayer3::new(config);
    ue.power_on();
    trace_outputs(&mut ue);

    let mut next_packet_id = 0u32;
    for timed in scenario.events.iter().take_while(|e| e.at_ms <= end.as_millis()) {
        ue.advance_to(SimTime::from_millis(timed.at_ms));
        trace_outputs(&mut ue);
        trace!("[{}] scenario: {:?}", ue.now(), timed.event);
        apply_event(&mut ue, &scenario, &timed.event, &mut next_packet_id);
        trace_outputs(&mut ue);
    }
    ue.advance_to(end);
    trace_outputs(&mut ue);

    let report = ue.stats().to_yaml().context("Failed to serialise statistics")?;
    println!("{report}");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Scenario failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
