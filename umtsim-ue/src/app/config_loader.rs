//! Configuration Loading for the UE
//!
//! Wraps [`UeConfig`] from `umtsim-common` with structural validation. Range
//! problems in radio parameters are not errors: they are replaced by
//! defaults with a warning (see [`UeConfig::normalize`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use umtsim_ue::app::load_and_validate_ue_config;
//!
//! let config = load_and_validate_ue_config("config/ue.yaml")?;
//! ```

use std::path::Path;

use thiserror::Error;
use umtsim_common::{PlmnId, UeConfig};

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ConfigValidationError),
}

/// Structural configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Invalid IMSI
    #[error("Invalid IMSI: {0}")]
    InvalidImsi(String),

    /// Invalid home PLMN
    #[error("Invalid home PLMN: {0}")]
    InvalidHplmn(String),

    /// A parameter that has no usable default
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Loads a UE configuration from a YAML file.
///
/// Out-of-range radio parameters are normalized to their defaults.
pub fn load_ue_config<P: AsRef<Path>>(path: P) -> Result<UeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    load_ue_config_from_str(&contents)
}

/// Loads a UE configuration from a YAML string.
pub fn load_ue_config_from_str(yaml: &str) -> Result<UeConfig, ConfigError> {
    let mut config: UeConfig =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.normalize();
    Ok(config)
}

/// Validates a UE configuration.
///
/// # Validation Rules
///
/// - IMSI must be 6 to 15 decimal digits
/// - Home PLMN MCC must be 001-999, MNC 00-999
/// - Active set size must be between 1 and 6
/// - Flow sweep interval must be positive
pub fn validate_ue_config(config: &UeConfig) -> Result<(), ConfigValidationError> {
    if !config.imsi.is_valid() {
        return Err(ConfigValidationError::InvalidImsi(format!(
            "'{}' must be 6 to 15 decimal digits",
            config.imsi.0
        )));
    }

    validate_hplmn(&config.home_plmn)?;

    if config.rrc.as_size_max == 0 || config.rrc.as_size_max > umtsim_common::config::MAX_ACTIVE_SET {
        return Err(ConfigValidationError::InvalidParameter(format!(
            "rrc.as_size_max {} must be between 1 and {}",
            config.rrc.as_size_max,
            umtsim_common::config::MAX_ACTIVE_SET
        )));
    }

    if config.flows.sweep_interval_ms == 0 {
        return Err(ConfigValidationError::InvalidParameter(
            "flows.sweep_interval_ms must be positive".to_string(),
        ));
    }

    Ok(())
}

fn validate_hplmn(plmn: &PlmnId) -> Result<(), ConfigValidationError> {
    if plmn.mcc == 0 || plmn.mcc > 999 {
        return Err(ConfigValidationError::InvalidHplmn(format!(
            "MCC {} must be between 001 and 999",
            plmn.mcc
        )));
    }
    if plmn.mnc > 999 {
        return Err(ConfigValidationError::InvalidHplmn(format!(
            "MNC {} must be between 00 and 999",
            plmn.mnc
        )));
    }
    Ok(())
}

/// Loads and validates a UE configuration in one step.
pub fn load_and_validate_ue_config<P: AsRef<Path>>(path: P) -> Result<UeConfig, ConfigError> {
    let config = load_ue_config(path)?;
    validate_ue_config(&config)?;
    Ok(config)
}
