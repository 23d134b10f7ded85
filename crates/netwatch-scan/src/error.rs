//! Error types for the netwatch-scan crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Discovery binary not found at path: {path}")]
    ProbeBinaryNotFound { path: String },

    #[error("Invalid scan target: {0}")]
    InvalidTarget(String),

    #[error("Store error: {0}")]
    Store(#[from] netwatch_store::StoreError),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
