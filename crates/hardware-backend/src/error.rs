//! Hardware backend errors

use pxe_server::BackendError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or querying hardware records
#[derive(Debug, Error)]
pub enum HardwareError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// NetBox API returned an error
    #[error("NetBox API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid token, expired, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No record matches the client
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record matched but is unusable
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Hardware file could not be read
    #[error("could not read file {path:?}: {source}")]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Hardware file is not a JSON array of hardware records
    #[error("unable to parse hardware file {path:?}: {source}")]
    Parse {
        /// File that was parsed
        path: PathBuf,
        /// Underlying decode error
        #[source]
        source: serde_json::Error,
    },
}

impl From<HardwareError> for BackendError {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::NotFound(what) => BackendError::NotFound(what),
            HardwareError::InvalidRecord(what) => BackendError::InvalidRecord(what),
            HardwareError::Serialization(e) => BackendError::InvalidRecord(e.to_string()),
            other => BackendError::Unavailable(other.to_string()),
        }
    }
}
