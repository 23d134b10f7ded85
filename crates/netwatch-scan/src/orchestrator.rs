//! Scan orchestration.
//!
//! Drives the periodic cadence: probe → enrichment → reconciliation →
//! on-demand rule triggers. A single-slot gate serializes cycles and
//! sweeps; a request arriving while one is in flight is skipped, never
//! queued, so long scans cannot compound into a backlog.

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use ipnet::Ipv4Net;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use uuid::Uuid;

use netwatch_core::events::EventKind;
use netwatch_store::WatchStore;

use crate::config::{RuleConfig, ScheduleConfig};
use crate::enrich::{Enricher, HostnameResolver};
use crate::error::Result;
use crate::ledger::{self, ReconcileSummary};
use crate::probe::Probe;
use crate::rules;

/// Outcome of one cycle or sweep request against the gate.
#[derive(Debug)]
pub enum CycleReport {
    /// The cycle ran and committed; the summary reflects committed state.
    Completed(ReconcileSummary),
    /// Another cycle or sweep held the gate; nothing ran.
    Skipped,
}

/// Sequences one end-to-end cycle and owns the coordination gate.
pub struct ScanOrchestrator<P, R> {
    store: WatchStore,
    probe: P,
    enricher: Enricher<R>,
    target: Ipv4Net,
    rules: RuleConfig,
    schedule: ScheduleConfig,
    gate: Mutex<()>,
}

impl<P: Probe, R: HostnameResolver> ScanOrchestrator<P, R> {
    pub fn new(
        store: WatchStore,
        probe: P,
        enricher: Enricher<R>,
        target: Ipv4Net,
        rules: RuleConfig,
        schedule: ScheduleConfig,
    ) -> Self {
        Self {
            store,
            probe,
            enricher,
            target,
            rules,
            schedule,
            gate: Mutex::new(()),
        }
    }

    /// Run one probe → enrich → reconcile → rule-trigger cycle.
    ///
    /// At most one cycle-or-sweep executes at a time; a contended gate
    /// skips the request.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let Ok(_guard) = self.gate.try_lock() else {
            tracing::warn!("Scan cycle already in flight, skipping");
            return Ok(CycleReport::Skipped);
        };

        let cycle_id = Uuid::new_v4();
        let start = Instant::now();
        tracing::info!(cycle_id = %cycle_id, target = %self.target, "Scan cycle started");

        let observations = self.probe.discover(self.target).await;

        let mut enriched = Vec::with_capacity(observations.len());
        for observation in observations {
            enriched.push(self.enricher.enrich(observation).await);
        }

        let now = Utc::now();
        let outcome = ledger::reconcile(&self.store, &enriched, now).await?;

        // On-demand frequent-reconnect checks for devices that reconnected
        // this cycle.
        let mut checked = HashSet::new();
        for event in &outcome.events {
            if event.kind == EventKind::DeviceReconnect && checked.insert(event.device_id) {
                rules::check_reconnect_frequency(&self.store, event.device_id, &self.rules, now)
                    .await?;
            }
        }

        tracing::info!(
            cycle_id = %cycle_id,
            total = outcome.summary.total_devices,
            online = outcome.summary.online_devices,
            new = outcome.summary.new_devices,
            duration_ms = start.elapsed().as_millis() as u64,
            "Scan cycle complete"
        );

        Ok(CycleReport::Completed(outcome.summary))
    }

    /// Run the inactive-device standing rule, serialized on the same gate.
    ///
    /// Returns the number of alerts created, or None when skipped.
    pub async fn run_inactive_sweep(&self) -> Result<Option<u64>> {
        let Ok(_guard) = self.gate.try_lock() else {
            tracing::warn!("Cycle in flight, skipping inactive sweep");
            return Ok(None);
        };

        let created = rules::sweep_inactive_devices(&self.store, &self.rules, Utc::now()).await?;
        Ok(Some(created))
    }

    /// Run as a daemon: periodic scan cycles plus periodic inactive
    /// sweeps. A failed cycle is logged and retried at the next tick;
    /// prior committed state is untouched.
    pub async fn run(&self) -> Result<()> {
        let mut scan_tick = interval(Duration::from_secs(self.schedule.scan_interval_secs));
        let mut sweep_tick = interval(Duration::from_secs(self.schedule.sweep_interval_secs));
        // Intervals fire immediately; eat the sweep's first tick so startup
        // runs a scan, not both.
        sweep_tick.tick().await;

        tracing::info!(
            scan_interval_secs = self.schedule.scan_interval_secs,
            sweep_interval_secs = self.schedule.sweep_interval_secs,
            "Orchestrator started"
        );

        loop {
            tokio::select! {
                _ = scan_tick.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::error!(error = %e, "Scan cycle failed");
                    }
                }
                _ = sweep_tick.tick() => {
                    if let Err(e) = self.run_inactive_sweep().await {
                        tracing::error!(error = %e, "Inactive sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::VendorDb;
    use crate::probe::Observation;
    use netwatch_core::types::{AlertKind, HardwareId};
    use std::net::Ipv4Addr;
    use std::sync::Mutex as StdMutex;

    /// Probe stub replaying one canned result per call.
    struct ScriptedProbe {
        results: StdMutex<Vec<Vec<Observation>>>,
    }

    impl ScriptedProbe {
        fn new(mut results: Vec<Vec<Observation>>) -> Self {
            results.reverse();
            Self {
                results: StdMutex::new(results),
            }
        }
    }

    impl Probe for ScriptedProbe {
        async fn discover(&self, _target: Ipv4Net) -> Vec<Observation> {
            self.results.lock().unwrap().pop().unwrap_or_default()
        }
    }

    struct NoResolver;

    impl HostnameResolver for NoResolver {
        async fn reverse_lookup(&self, _ip: Ipv4Addr) -> Option<String> {
            None
        }
    }

    fn observation(hw: &str, ip: &str) -> Observation {
        Observation {
            ip: ip.parse().unwrap(),
            hardware_id: HardwareId::parse(hw).unwrap(),
            observed_at: Utc::now(),
        }
    }

    async fn orchestrator(
        results: Vec<Vec<Observation>>,
    ) -> ScanOrchestrator<ScriptedProbe, NoResolver> {
        let store = WatchStore::open_in_memory().await.unwrap();
        ScanOrchestrator::new(
            store,
            ScriptedProbe::new(results),
            Enricher::new(VendorDb::empty(), NoResolver),
            "10.0.0.0/24".parse().unwrap(),
            RuleConfig::default(),
            ScheduleConfig::default(),
        )
    }

    #[tokio::test]
    async fn cycle_summary_reflects_committed_state() {
        let orch = orchestrator(vec![
            vec![
                observation("aa:bb:cc:00:00:01", "10.0.0.1"),
                observation("aa:bb:cc:00:00:02", "10.0.0.2"),
            ],
            vec![observation("aa:bb:cc:00:00:01", "10.0.0.1")],
        ])
        .await;

        let CycleReport::Completed(first) = orch.run_cycle().await.unwrap() else {
            panic!("first cycle skipped");
        };
        assert_eq!(first.total_devices, 2);
        assert_eq!(first.online_devices, 2);
        assert_eq!(first.new_devices, 2);

        let CycleReport::Completed(second) = orch.run_cycle().await.unwrap() else {
            panic!("second cycle skipped");
        };
        assert_eq!(second.total_devices, 2);
        assert_eq!(second.online_devices, 1);
        assert_eq!(second.new_devices, 0);
    }

    #[tokio::test]
    async fn contended_gate_skips_instead_of_queueing() {
        let orch = orchestrator(vec![vec![]]).await;

        let _held = orch.gate.lock().await;
        assert!(matches!(orch.run_cycle().await.unwrap(), CycleReport::Skipped));
        assert!(orch.run_inactive_sweep().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_reconnects_trigger_frequent_reconnect_alert() {
        // Five absent/present flips: five reconnect events inside the
        // default window, so the fifth cycle raises the alert.
        let present = vec![observation("aa:bb:cc:00:00:03", "10.0.0.3")];
        let mut script = vec![present.clone()];
        for _ in 0..5 {
            script.push(vec![]);
            script.push(present.clone());
        }
        let orch = orchestrator(script).await;

        for _ in 0..11 {
            orch.run_cycle().await.unwrap();
        }

        let device = orch.store.devices().await.unwrap().remove(0);
        let alerts = orch.store.alerts_for_device(device.id).await.unwrap();
        let frequent: Vec<_> = alerts
            .iter()
            .filter(|a| a.kind == AlertKind::FrequentReconnect)
            .collect();
        assert_eq!(frequent.len(), 1);
    }

    #[tokio::test]
    async fn sweep_runs_between_cycles() {
        let orch = orchestrator(vec![vec![observation("aa:bb:cc:00:00:04", "10.0.0.4")]]).await;
        orch.run_cycle().await.unwrap();

        // Nothing inactive yet: device is online and fresh.
        assert_eq!(orch.run_inactive_sweep().await.unwrap(), Some(0));
    }
}
