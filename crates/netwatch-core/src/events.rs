//! Event types for the append-only transition log.
//!
//! Events describe one device state transition each and are never mutated
//! or deleted once written. Ordering is by timestamp, ties broken by
//! insertion order.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{HardwareId, Severity};

/// The kind of transition an event records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DeviceJoin,
    DeviceLeave,
    DeviceReconnect,
    AddressChange,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceJoin => "device_join",
            Self::DeviceLeave => "device_leave",
            Self::DeviceReconnect => "device_reconnect",
            Self::AddressChange => "address_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "device_join" => Some(Self::DeviceJoin),
            "device_leave" => Some(Self::DeviceLeave),
            "device_reconnect" => Some(Self::DeviceReconnect),
            "address_change" => Some(Self::AddressChange),
            _ => None,
        }
    }
}

/// An immutable log entry describing one device transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub device_id: i64,
    pub kind: EventKind,
    pub severity: Severity,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Structured detail payload attached to `device_join` events.
///
/// This is the only wire shape NetWatch owns: named string fields consumed
/// by the external presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinDetails {
    pub ip: String,
    pub mac: String,
    pub vendor: String,
    pub hostname: Option<String>,
}

/// Field set for appending an event to the log.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub device_id: i64,
    pub kind: EventKind,
    pub severity: Severity,
    pub description: String,
    pub details: Option<serde_json::Value>,
}

impl NewEvent {
    /// A new device was observed for the first time.
    pub fn join(device_id: i64, details: &JoinDetails) -> Self {
        Self {
            device_id,
            kind: EventKind::DeviceJoin,
            severity: Severity::Medium,
            description: "New device detected on network".to_string(),
            details: serde_json::to_value(details).ok(),
        }
    }

    /// A previously-online device was absent from the latest sweep.
    pub fn leave(device_id: i64) -> Self {
        Self {
            device_id,
            kind: EventKind::DeviceLeave,
            severity: Severity::Low,
            description: "Device disconnected from network".to_string(),
            details: None,
        }
    }

    /// An offline device answered a sweep again.
    pub fn reconnect(device_id: i64) -> Self {
        Self {
            device_id,
            kind: EventKind::DeviceReconnect,
            severity: Severity::Low,
            description: "Device reconnected to network".to_string(),
            details: None,
        }
    }

    /// A known device answered from a different address than recorded.
    pub fn address_change(device_id: i64, old: Option<Ipv4Addr>, new: Ipv4Addr) -> Self {
        let old = old
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "none".to_string());
        Self {
            device_id,
            kind: EventKind::AddressChange,
            severity: Severity::Medium,
            description: format!("Device IP changed from {old} to {new}"),
            details: None,
        }
    }
}

/// Convenience constructor for the join payload.
impl JoinDetails {
    pub fn new(ip: Ipv4Addr, hardware_id: &HardwareId, vendor: &str, hostname: Option<&str>) -> Self {
        Self {
            ip: ip.to_string(),
            mac: hardware_id.to_string(),
            vendor: vendor.to_string(),
            hostname: hostname.map(String::from),
        }
    }
}
