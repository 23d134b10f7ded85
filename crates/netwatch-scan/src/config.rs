//! Configuration for the netwatch-scan daemon.

use serde::Deserialize;

/// Top-level scan configuration.
///
/// Loaded from `netwatch.toml` or `NETWATCH__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Path to the SQLite ledger database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub enrich: EnrichConfig,

    #[serde(default)]
    pub rules: RuleConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Discovery sweep settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Path to the arp-scan binary (default: "arp-scan").
    #[serde(default = "default_arp_scan_path")]
    pub arp_scan_path: String,

    /// Target range in CIDR notation. When absent, a /24 around the
    /// host's outbound-routing-selected address is derived.
    #[serde(default)]
    pub target: Option<String>,

    /// Network interface to sweep on (arp-scan picks one if unset).
    #[serde(default)]
    pub interface: Option<String>,

    /// Seconds to wait for responses after the broadcast.
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

/// Best-effort lookup settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichConfig {
    /// Path to a local OUI vendor export. Absent or unreadable means every
    /// vendor lookup resolves "Unknown".
    #[serde(default)]
    pub oui_db_path: Option<String>,

    /// Upper bound on one reverse-DNS lookup.
    #[serde(default = "default_resolver_timeout")]
    pub resolver_timeout_ms: u64,
}

/// Thresholds for the alerting rules.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Reconnect count at which the frequent-reconnect alert fires.
    #[serde(default = "default_reconnect_threshold")]
    pub reconnect_threshold: u32,

    /// Trailing window for reconnect counting, in seconds.
    #[serde(default = "default_reconnect_window")]
    pub reconnect_window_secs: u64,

    /// Hours offline after which a device counts as inactive.
    #[serde(default = "default_inactive_hours")]
    pub inactive_threshold_hours: u64,
}

/// Cadence of the periodic driver.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between scan cycles.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Seconds between inactive-device sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_db_path() -> String {
    "./netwatch.db".to_string()
}

fn default_arp_scan_path() -> String {
    "arp-scan".to_string()
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_resolver_timeout() -> u64 {
    1500
}

fn default_reconnect_threshold() -> u32 {
    5
}

fn default_reconnect_window() -> u64 {
    3600
}

fn default_inactive_hours() -> u64 {
    24
}

fn default_scan_interval() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    3600
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            probe: ProbeConfig::default(),
            enrich: EnrichConfig::default(),
            rules: RuleConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            arp_scan_path: default_arp_scan_path(),
            target: None,
            interface: None,
            timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            oui_db_path: None,
            resolver_timeout_ms: default_resolver_timeout(),
        }
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            reconnect_threshold: default_reconnect_threshold(),
            reconnect_window_secs: default_reconnect_window(),
            inactive_threshold_hours: default_inactive_hours(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}
