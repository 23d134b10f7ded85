//! netwatch-core: Shared types and error handling for NetWatch.
//!
//! This crate provides the foundational types used across all NetWatch
//! components:
//! - Device and Alert records for the asset ledger
//! - Event types for the append-only transition log
//! - The canonicalized hardware-id device key
//! - Common error types

pub mod error;
pub mod events;
pub mod types;

pub use error::CoreError;
