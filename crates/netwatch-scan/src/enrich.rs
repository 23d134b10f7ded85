//! Best-effort enrichment of probe observations.
//!
//! Two independent lookups: hardware-id to vendor name via a local OUI
//! export, and address to reverse-DNS hostname. Both degrade on failure
//! ("Unknown" / no hostname) and neither may stall reconciliation beyond
//! its own bound.

use std::net::Ipv4Addr;
use std::time::Duration;

use oui::OuiDatabase;
use tokio::process::Command;

use netwatch_core::types::HardwareId;

use crate::probe::Observation;

/// Literal label for a vendor lookup miss.
pub const UNKNOWN_VENDOR: &str = "Unknown";

/// An observation with its best-effort vendor and hostname attached.
#[derive(Debug, Clone)]
pub struct EnrichedObservation {
    pub observation: Observation,
    pub vendor: String,
    pub hostname: Option<String>,
}

// ── Vendor lookup ─────────────────────────────────────────────────

/// Local OUI vendor table.
///
/// A missing or unreadable export file degrades to an empty table where
/// every lookup misses; it never fails the caller.
pub struct VendorDb {
    db: Option<OuiDatabase>,
}

impl VendorDb {
    pub fn load(path: Option<&str>) -> Self {
        let db = match path {
            Some(path) => match OuiDatabase::new_from_file(path) {
                Ok(db) => Some(db),
                Err(e) => {
                    tracing::warn!(
                        path = %path,
                        error = %e,
                        "Failed to load vendor table, all lookups will resolve Unknown"
                    );
                    None
                }
            },
            None => None,
        };
        Self { db }
    }

    /// An always-missing table, for setups without a vendor export.
    pub fn empty() -> Self {
        Self { db: None }
    }

    /// Map a hardware id's vendor-significant prefix to a manufacturer
    /// name; any miss returns the literal "Unknown".
    pub fn lookup(&self, hardware_id: &HardwareId) -> String {
        let Some(db) = &self.db else {
            return UNKNOWN_VENDOR.to_string();
        };
        match db.query_by_str(hardware_id.as_str()) {
            Ok(Some(entry)) => entry
                .name_long
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN_VENDOR.to_string()),
            _ => UNKNOWN_VENDOR.to_string(),
        }
    }
}

// ── Hostname lookup ───────────────────────────────────────────────

/// Reverse-resolution of an address to a hostname. Any failure is "no
/// hostname", never an error.
#[allow(async_fn_in_trait)]
pub trait HostnameResolver {
    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String>;
}

/// Resolver shelling out to nslookup, bounded by a timeout.
pub struct DnsCommandResolver {
    timeout: Duration,
}

impl DnsCommandResolver {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

impl HostnameResolver for DnsCommandResolver {
    async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new("nslookup")
                .arg(ip.to_string())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .ok()?
        .ok()?;

        if !output.status.success() {
            return None;
        }

        parse_nslookup_output(&String::from_utf8_lossy(&output.stdout), ip)
    }
}

/// Pull the resolved name out of nslookup's `name = host.` line.
pub(crate) fn parse_nslookup_output(stdout: &str, ip: Ipv4Addr) -> Option<String> {
    for line in stdout.lines() {
        if let Some(pos) = line.find("name = ") {
            let host = line[pos + 7..].trim().trim_end_matches('.');
            if !host.is_empty() && host != ip.to_string() {
                return Some(host.to_string());
            }
        }
    }
    None
}

// ── Enricher ──────────────────────────────────────────────────────

/// Applies both lookups to each discovered record.
pub struct Enricher<R> {
    vendor_db: VendorDb,
    resolver: R,
}

impl<R: HostnameResolver> Enricher<R> {
    pub fn new(vendor_db: VendorDb, resolver: R) -> Self {
        Self {
            vendor_db,
            resolver,
        }
    }

    pub async fn enrich(&self, observation: Observation) -> EnrichedObservation {
        let vendor = self.vendor_db.lookup(&observation.hardware_id);
        let hostname = self.resolver.reverse_lookup(observation.ip).await;
        EnrichedObservation {
            observation,
            vendor,
            hostname,
        }
    }
}
