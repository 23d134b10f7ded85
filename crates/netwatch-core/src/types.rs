//! Core domain types for the NetWatch asset ledger.
//!
//! These types represent the durable registry of every device ever observed
//! on the monitored segment, plus the alerts derived from its history.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── Hardware id ───────────────────────────────────────────────────

/// Canonicalized link-layer hardware address, the device primary key.
///
/// Canonical form is uppercase colon-separated six-octet
/// (`AA:BB:CC:DD:EE:FF`). Dash, dot-grouped, and bare-hex inputs are
/// accepted and normalized. The id is immutable after creation and is
/// trusted as device identity; MAC randomization and spoofing are
/// documented limitations, not guarded against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HardwareId(String);

impl HardwareId {
    /// Parse and canonicalize a raw hardware address.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();

        if cleaned.len() != 12 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidHardwareId(raw.to_string()));
        }

        let upper = cleaned.to_ascii_uppercase();
        let mut canonical = String::with_capacity(17);
        for (i, chunk) in upper.as_bytes().chunks(2).enumerate() {
            if i > 0 {
                canonical.push(':');
            }
            canonical.push_str(&String::from_utf8_lossy(chunk));
        }

        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Severity ──────────────────────────────────────────────────────

/// Severity attached to events and alerts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

// ── Device ────────────────────────────────────────────────────────

/// One row per distinct hardware id ever seen on the segment.
///
/// Created on first observation by the ledger and never deleted by core
/// logic. `last_seen` is monotonically non-decreasing; `is_online == false`
/// means no probe has reported the hardware id since the last
/// reconciliation. `device_name`, `is_trusted`, and `risk_score` are edited
/// by external collaborators, never by reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub hardware_id: HardwareId,
    pub ip_address: Option<Ipv4Addr>,
    pub device_name: Option<String>,
    pub vendor: String,
    pub hostname: Option<String>,
    pub is_trusted: bool,
    pub risk_score: i64,
    pub is_online: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Default risk score assigned to newly discovered devices.
pub const DEFAULT_RISK_SCORE: i64 = 50;

/// Field set for creating a device on first observation.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub hardware_id: HardwareId,
    pub ip_address: Ipv4Addr,
    pub vendor: String,
    pub hostname: Option<String>,
}

// ── Alert ─────────────────────────────────────────────────────────

/// The kind of condition an alert describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    NewDevice,
    AddressChange,
    FrequentReconnect,
    DeviceInactive,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewDevice => "new_device",
            Self::AddressChange => "address_change",
            Self::FrequentReconnect => "frequent_reconnect",
            Self::DeviceInactive => "device_inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_device" => Some(Self::NewDevice),
            "address_change" => Some(Self::AddressChange),
            "frequent_reconnect" => Some(Self::FrequentReconnect),
            "device_inactive" => Some(Self::DeviceInactive),
            _ => None,
        }
    }
}

/// Triage status of an alert. Transitions are performed by the external
/// presentation layer; core logic only ever creates alerts as `Active`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "acknowledged" => Some(Self::Acknowledged),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// A derived record meant for human triage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub device_id: i64,
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub status: AlertStatus,
    pub triggered_at: DateTime<Utc>,
}

/// Field set for creating an alert; status is always `Active` at creation.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub device_id: i64,
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_id_canonicalizes_separators() {
        let colon = HardwareId::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let dash = HardwareId::parse("AA-BB-CC-DD-EE-FF").unwrap();
        let dotted = HardwareId::parse("aabb.ccdd.eeff").unwrap();
        let bare = HardwareId::parse("aabbccddeeff").unwrap();

        assert_eq!(colon.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(colon, dash);
        assert_eq!(colon, dotted);
        assert_eq!(colon, bare);
    }

    #[test]
    fn hardware_id_rejects_malformed() {
        assert!(HardwareId::parse("").is_err());
        assert!(HardwareId::parse("aa:bb:cc:dd:ee").is_err());
        assert!(HardwareId::parse("zz:bb:cc:dd:ee:ff").is_err());
        assert!(HardwareId::parse("aa:bb:cc:dd:ee:ff:00").is_err());
    }

    #[test]
    fn severity_roundtrip() {
        for sev in [Severity::Low, Severity::Medium, Severity::High] {
            assert_eq!(Severity::parse(sev.as_str()), Some(sev));
        }
        assert_eq!(Severity::parse("critical"), None);
    }

    #[test]
    fn alert_kind_roundtrip() {
        for kind in [
            AlertKind::NewDevice,
            AlertKind::AddressChange,
            AlertKind::FrequentReconnect,
            AlertKind::DeviceInactive,
        ] {
            assert_eq!(AlertKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AlertKind::parse("bogus"), None);
    }

    #[test]
    fn alert_kind_serializes_snake_case() {
        let json = serde_json::to_string(&AlertKind::FrequentReconnect).unwrap();
        assert_eq!(json, "\"frequent_reconnect\"");
    }
}
