//! Error types for dhlink core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using dhlink core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for dhlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The prime list could not be read
    #[error("Failed to read prime list {}: {source}", path.display())]
    PrimeList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Merged config layers do not form a valid configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
