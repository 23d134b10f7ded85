use thiserror::Error;

/// Top-level error type for NetWatch domain types.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid hardware id: {0}")]
    InvalidHardwareId(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
