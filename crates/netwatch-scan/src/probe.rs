//! Discovery probe.
//!
//! Wraps the arp-scan binary via `tokio::process::Command`: one bounded
//! ARP sweep over a CIDR range, parsed into typed observations. A failed
//! or timed-out sweep is operationally equivalent to "nothing responded" —
//! the next cycle is the retry.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use tokio::process::Command;

use netwatch_core::types::HardwareId;

use crate::config::ProbeConfig;
use crate::error::{Result, ScanError};

/// Extra wall-clock allowance over the response wait for process spawn and
/// packet transmission across the range.
const PROCESS_GRACE: Duration = Duration::from_secs(8);

/// One reachable (address, hardware-id) pair from a sweep.
#[derive(Debug, Clone)]
pub struct Observation {
    pub ip: Ipv4Addr,
    pub hardware_id: HardwareId,
    pub observed_at: DateTime<Utc>,
}

/// A discovery pass over a target range. Pure function of the network at a
/// point in time; implementations hold no persisted state.
#[allow(async_fn_in_trait)]
pub trait Probe {
    async fn discover(&self, target: Ipv4Net) -> Vec<Observation>;
}

/// Wrapper around the arp-scan binary.
pub struct ArpScanProbe {
    binary_path: String,
    interface: Option<String>,
    timeout: Duration,
}

impl ArpScanProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            binary_path: config.arp_scan_path.clone(),
            interface: config.interface.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Verify arp-scan is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| ScanError::ProbeBinaryNotFound {
                path: self.binary_path.clone(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            return Ok(stdout.into_owned());
        }
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }

    async fn sweep(&self, target: Ipv4Net) -> std::io::Result<Vec<Observation>> {
        let mut command = Command::new(&self.binary_path);
        if let Some(interface) = &self.interface {
            command.arg(format!("--interface={interface}"));
        }
        command
            .arg(format!("--timeout={}", self.timeout.as_millis()))
            .arg(target.to_string())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout + PROCESS_GRACE, command.output())
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "sweep timed out"))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(std::io::Error::other(format!(
                "arp-scan exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_sweep_output(&stdout, Utc::now()))
    }
}

impl Probe for ArpScanProbe {
    async fn discover(&self, target: Ipv4Net) -> Vec<Observation> {
        match self.sweep(target).await {
            Ok(observations) => {
                tracing::info!(
                    target = %target,
                    responders = observations.len(),
                    "Discovery sweep complete"
                );
                observations
            }
            Err(e) => {
                tracing::warn!(
                    target = %target,
                    error = %e,
                    "Discovery sweep failed, treating as empty"
                );
                Vec::new()
            }
        }
    }
}

/// Parse arp-scan stdout into observations.
///
/// Responder lines carry an address and a hardware id as the first two
/// fields; header, footer, and blank lines don't and are skipped.
pub(crate) fn parse_sweep_output(stdout: &str, observed_at: DateTime<Utc>) -> Vec<Observation> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ip = fields.next()?.parse::<Ipv4Addr>().ok()?;
            let hardware_id = HardwareId::parse(fields.next()?).ok()?;
            Some(Observation {
                ip,
                hardware_id,
                observed_at,
            })
        })
        .collect()
}

/// Resolve the configured target, deriving one when absent.
pub fn resolve_target(config: &ProbeConfig) -> Result<Ipv4Net> {
    match &config.target {
        Some(raw) => raw
            .parse::<Ipv4Net>()
            .map_err(|e| ScanError::InvalidTarget(format!("{raw}: {e}"))),
        None => derive_local_target(),
    }
}

/// Derive a /24 around the host's outbound-routing-selected local address.
///
/// Heuristic: takes the first three octets of whichever local address the
/// OS would route 8.8.8.8 through. May be wrong on non-/24 topologies;
/// configure `probe.target` explicitly there.
pub fn derive_local_target() -> Result<Ipv4Net> {
    let socket = std::net::UdpSocket::bind(("0.0.0.0", 0))?;
    socket.connect(("8.8.8.8", 80))?;
    let local = socket.local_addr()?;

    let IpAddr::V4(ip) = local.ip() else {
        return Err(ScanError::InvalidTarget(
            "local address is not IPv4".to_string(),
        ));
    };

    let [a, b, c, _] = ip.octets();
    Ipv4Net::new(Ipv4Addr::new(a, b, c, 0), 24)
        .map_err(|e| ScanError::InvalidTarget(e.to_string()))
}
