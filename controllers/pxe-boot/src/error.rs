//! Configuration errors for the PXE boot server binary

use thiserror::Error;

/// Environment configuration problems, reported before anything is bound
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but its value cannot be used
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        /// Environment variable
        name: &'static str,
        value: String,
        reason: String,
    },

    /// A variable required by the selected backend is not set
    #[error("{0} environment variable is required")]
    Missing(&'static str),
}
