//! CLI entry point for the netwatch-scan daemon.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use netwatch_store::WatchStore;

use netwatch_scan::config::WatchConfig;
use netwatch_scan::enrich::{DnsCommandResolver, Enricher, VendorDb};
use netwatch_scan::orchestrator::{CycleReport, ScanOrchestrator};
use netwatch_scan::probe::{resolve_target, ArpScanProbe};

#[derive(Parser)]
#[command(name = "netwatch-scan")]
#[command(about = "Network asset discovery and anomaly alerting for NetWatch")]
struct Cli {
    /// Target to scan (CIDR notation, e.g., 192.168.1.0/24).
    #[arg(short, long)]
    target: Option<String>,

    /// Run a single scan cycle and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled scans and sweeps.
    #[arg(long)]
    daemon: bool,

    /// Override the ledger database path.
    #[arg(long)]
    db: Option<String>,

    /// Config file prefix (default: netwatch).
    #[arg(short, long, default_value = "netwatch")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut watch_config = load_watch_config(&cli.config)?;
    if let Some(target) = cli.target {
        watch_config.probe.target = Some(target);
    }
    if let Some(db) = cli.db {
        watch_config.db_path = db;
    }

    let store = WatchStore::open(&watch_config.db_path).await?;

    // Verify arp-scan installation before committing to a schedule.
    let probe = ArpScanProbe::new(&watch_config.probe);
    let version = probe.verify_installation().await?;
    tracing::info!(arp_scan_version = %version.trim(), "Discovery binary verified");

    let target = resolve_target(&watch_config.probe)?;

    let vendor_db = VendorDb::load(watch_config.enrich.oui_db_path.as_deref());
    let resolver = DnsCommandResolver::new(watch_config.enrich.resolver_timeout_ms);
    let enricher = Enricher::new(vendor_db, resolver);

    let orchestrator = ScanOrchestrator::new(
        store,
        probe,
        enricher,
        target,
        watch_config.rules.clone(),
        watch_config.schedule.clone(),
    );

    if cli.once {
        match orchestrator.run_cycle().await? {
            CycleReport::Completed(summary) => {
                tracing::info!(
                    total = summary.total_devices,
                    online = summary.online_devices,
                    new = summary.new_devices,
                    "Cycle summary"
                );
            }
            CycleReport::Skipped => {}
        }
    } else if cli.daemon {
        orchestrator.run().await?;
    } else {
        anyhow::bail!("Specify --once (single scan cycle) or --daemon (scheduled scanning)");
    }

    Ok(())
}

fn load_watch_config(file_prefix: &str) -> anyhow::Result<WatchConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("NETWATCH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.try_deserialize::<WatchConfig>() {
        Ok(c) => Ok(c),
        Err(_) => Ok(WatchConfig::default()),
    }
}
