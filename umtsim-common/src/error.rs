//! Error types for umtsim

use thiserror::Error;

/// Errors raised while loading or saving a UE configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}
