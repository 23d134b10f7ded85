//! netwatch-scan: network discovery and anomaly alerting for NetWatch.
//!
//! Sweeps a local segment for reachable devices, reconciles the result
//! against the durable device ledger, and evaluates threshold rules that
//! turn transition events into alerts.

pub mod config;
pub mod enrich;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod probe;
pub mod rules;
