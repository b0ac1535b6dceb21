//! Logging infrastructure for umtsim
//!
//! Configurable `tracing` setup, Layer-3 message logging and hex formatting
//! of message payloads.

use std::fmt;
use tracing::Level;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Most verbose, includes payload hex dumps
    Trace,
    /// State transitions and message traffic
    Debug,
    /// Procedure milestones (default)
    #[default]
    Info,
    /// Discarded messages and configuration fallbacks
    Warn,
    /// Errors only
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

/// Initialize the tracing subscriber with the specified log level.
///
/// Call once at startup. `RUST_LOG` overrides the level when set.
pub fn init_logging(level: LogLevel) {
    init_logging_with_filter(&level.to_string());
}

/// Initialize logging with a custom filter string such as
/// `"info,umtsim_ue::rrc=debug"`.
pub fn init_logging_with_filter(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_span_events(FmtSpan::NONE)
        .init();
}

/// Message direction relative to the UE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Downlink, received by the UE
    Rx,
    /// Uplink, sent by the UE
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

/// Log a Layer-3 message at debug level with a hex dump at trace level.
///
/// # Example
///
/// ```
/// use umtsim_common::logging::{log_protocol_message, Direction};
///
/// log_protocol_message("MM", Direction::Tx, "LOCATION UPDATING REQUEST", &[0x50, 0x08, 0, 0]);
/// ```
pub fn log_protocol_message(protocol: &str, direction: Direction, msg_type: &str, data: &[u8]) {
    tracing::debug!(
        protocol = protocol,
        direction = %direction,
        msg_type = msg_type,
        len = data.len(),
        "{} {} {}",
        direction,
        protocol,
        msg_type
    );
    tracing::trace!(protocol = protocol, hex = %HexDump(data), "{} payload", protocol);
}

/// Wrapper for hex formatting in log fields
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Format bytes as space separated groups of `group_size` bytes
/// (no grouping when zero).
///
/// ```
/// use umtsim_common::logging::format_hex_compact;
///
/// assert_eq!(format_hex_compact(&[0x35, 0x05, 0x00, 0x00], 2), "3505 0000");
/// ```
pub fn format_hex_compact(data: &[u8], group_size: usize) -> String {
    if group_size == 0 {
        return hex::encode(data);
    }
    data.chunks(group_size)
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join(" ")
}
