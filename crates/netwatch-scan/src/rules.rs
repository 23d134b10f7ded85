//! Threshold rules converting ledger history into alerts.
//!
//! The inline rules (new device, address change) are invoked by the ledger
//! inside the cycle transaction. The standing rules run in their own
//! transactions: the dedup check is re-validated next to the insert, so a
//! lost race skips creation rather than double-alerting.

use std::net::Ipv4Addr;

use chrono::{DateTime, TimeDelta, Utc};

use netwatch_core::events::EventKind;
use netwatch_core::types::{AlertKind, NewAlert, Severity};
use netwatch_store::{alert, device, event, WatchStore};

use crate::config::RuleConfig;
use crate::enrich::EnrichedObservation;
use crate::error::Result;

// ── Inline rules ──────────────────────────────────────────────────

/// High-severity alert for a device's first appearance. Fires once per
/// device by construction; no dedup needed.
pub fn new_device_alert(device_id: i64, obs: &EnrichedObservation) -> NewAlert {
    NewAlert {
        device_id,
        kind: AlertKind::NewDevice,
        severity: Severity::High,
        title: "New Device Detected".to_string(),
        description: format!(
            "Unknown device joined network: {} ({})",
            obs.observation.ip, obs.vendor
        ),
    }
}

/// Medium-severity alert for an address delta between cycles.
pub fn address_change_alert(
    device_id: i64,
    label: &str,
    old: Option<Ipv4Addr>,
    new: Ipv4Addr,
) -> NewAlert {
    let old = old
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "none".to_string());
    NewAlert {
        device_id,
        kind: AlertKind::AddressChange,
        severity: Severity::Medium,
        title: "Device IP Address Changed".to_string(),
        description: format!("Device {label} changed IP from {old} to {new}"),
    }
}

// ── Standing rules ────────────────────────────────────────────────

/// Count reconnects for one device in the trailing window; at or above the
/// threshold, raise a high-severity frequent-reconnect alert.
///
/// Intended to run on demand after a cycle that produced a reconnect for
/// the device. Returns whether an alert was created — an existing active
/// one absorbs the condition.
pub async fn check_reconnect_frequency(
    store: &WatchStore,
    device_id: i64,
    config: &RuleConfig,
    now: DateTime<Utc>,
) -> Result<bool> {
    let since = now - TimeDelta::seconds(config.reconnect_window_secs as i64);

    let mut tx = store.begin().await?;
    let count = event::count_since(&mut tx, device_id, EventKind::DeviceReconnect, since).await?;

    if count < config.reconnect_threshold as i64 {
        tx.rollback().await?;
        return Ok(false);
    }

    let candidate = NewAlert {
        device_id,
        kind: AlertKind::FrequentReconnect,
        severity: Severity::High,
        title: "Frequent Reconnection Detected".to_string(),
        description: format!(
            "Device reconnected {count} times in the last {} seconds",
            config.reconnect_window_secs
        ),
    };
    let created = alert::insert_if_no_active(&mut tx, &candidate, now).await?;
    tx.commit().await?;

    if created.is_some() {
        tracing::warn!(device_id, count, "Frequent reconnection detected");
    }
    Ok(created.is_some())
}

/// Raise a low-severity alert for every device offline longer than the
/// threshold, skipping devices that already have an active one.
///
/// Runs as a periodic sweep; each device's check-and-insert is its own
/// atomic unit, so the sweep may interleave with a reconciliation cycle.
/// Returns the number of alerts created.
pub async fn sweep_inactive_devices(
    store: &WatchStore,
    config: &RuleConfig,
    now: DateTime<Utc>,
) -> Result<u64> {
    let cutoff = now - TimeDelta::hours(config.inactive_threshold_hours as i64);

    let stale = {
        let mut conn = store.pool().acquire().await?;
        device::fetch_inactive(&mut conn, cutoff).await?
    };

    let mut created = 0u64;
    for device in &stale {
        let candidate = NewAlert {
            device_id: device.id,
            kind: AlertKind::DeviceInactive,
            severity: Severity::Low,
            title: "Device Inactive".to_string(),
            description: format!(
                "Device has been offline for more than {} hours",
                config.inactive_threshold_hours
            ),
        };

        let mut tx = store.begin().await?;
        if alert::insert_if_no_active(&mut tx, &candidate, now).await?.is_some() {
            created += 1;
        }
        tx.commit().await?;
    }

    if created > 0 {
        tracing::info!(
            stale = stale.len(),
            alerts = created,
            "Inactive device sweep raised alerts"
        );
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_core::events::NewEvent;
    use netwatch_core::types::{HardwareId, NewDevice};

    async fn seed_device(store: &WatchStore, now: DateTime<Utc>) -> i64 {
        let mut tx = store.begin().await.unwrap();
        let id = device::insert(
            &mut tx,
            &NewDevice {
                hardware_id: HardwareId::parse("aa:bb:cc:dd:ee:01").unwrap(),
                ip_address: "10.0.0.21".parse().unwrap(),
                vendor: "Acme".to_string(),
                hostname: None,
            },
            now,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        id
    }

    async fn seed_reconnects(store: &WatchStore, device_id: i64, base: DateTime<Utc>, offsets: &[i64]) {
        let mut tx = store.begin().await.unwrap();
        for offset in offsets {
            event::insert(
                &mut tx,
                &NewEvent::reconnect(device_id),
                base + TimeDelta::seconds(*offset),
            )
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn five_reconnects_in_window_fire_the_alert() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let base = Utc::now() - TimeDelta::seconds(2400);
        let device_id = seed_device(&store, base).await;
        seed_reconnects(&store, device_id, base, &[0, 600, 1200, 1800, 2400]).await;

        let fired = check_reconnect_frequency(
            &store,
            device_id,
            &RuleConfig::default(),
            base + TimeDelta::seconds(2400),
        )
        .await
        .unwrap();

        assert!(fired);
        let alerts = store.alerts_for_device(device_id).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::FrequentReconnect);
        assert_eq!(alerts[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn four_reconnects_do_not_fire() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let base = Utc::now() - TimeDelta::seconds(2000);
        let device_id = seed_device(&store, base).await;
        seed_reconnects(&store, device_id, base, &[0, 600, 1200, 1800]).await;

        let fired = check_reconnect_frequency(
            &store,
            device_id,
            &RuleConfig::default(),
            base + TimeDelta::seconds(1800),
        )
        .await
        .unwrap();

        assert!(!fired);
        assert!(store.alerts_for_device(device_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rolling_window_expires_old_reconnects() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let base = Utc::now() - TimeDelta::seconds(4000);
        let device_id = seed_device(&store, base).await;
        // Five reconnects total, but the t=0 one falls outside every window
        // containing t=4000: only four are ever in one window.
        seed_reconnects(&store, device_id, base, &[0, 600, 1200, 1800, 4000]).await;

        let fired = check_reconnect_frequency(
            &store,
            device_id,
            &RuleConfig::default(),
            base + TimeDelta::seconds(4000),
        )
        .await
        .unwrap();

        assert!(!fired);
    }

    #[tokio::test]
    async fn frequent_reconnect_alert_is_deduplicated_while_active() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let base = Utc::now() - TimeDelta::seconds(2400);
        let device_id = seed_device(&store, base).await;
        seed_reconnects(&store, device_id, base, &[0, 600, 1200, 1800, 2400]).await;
        let now = base + TimeDelta::seconds(2400);
        let config = RuleConfig::default();

        assert!(check_reconnect_frequency(&store, device_id, &config, now).await.unwrap());
        assert!(!check_reconnect_frequency(&store, device_id, &config, now).await.unwrap());
        assert_eq!(store.alerts_for_device(device_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_sweep_alerts_once_regardless_of_repeats() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let past = Utc::now() - TimeDelta::hours(48);
        let device_id = seed_device(&store, past).await;

        let mut tx = store.begin().await.unwrap();
        device::mark_offline(&mut tx, device_id).await.unwrap();
        tx.commit().await.unwrap();

        let config = RuleConfig::default();
        let now = Utc::now();
        assert_eq!(sweep_inactive_devices(&store, &config, now).await.unwrap(), 1);
        assert_eq!(sweep_inactive_devices(&store, &config, now).await.unwrap(), 0);
        assert_eq!(sweep_inactive_devices(&store, &config, now).await.unwrap(), 0);

        let alerts = store.alerts_for_device(device_id).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::DeviceInactive);
        assert_eq!(alerts[0].severity, Severity::Low);
    }

    #[tokio::test]
    async fn recently_offline_devices_are_not_inactive() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let now = Utc::now();
        let device_id = seed_device(&store, now - TimeDelta::hours(2)).await;

        let mut tx = store.begin().await.unwrap();
        device::mark_offline(&mut tx, device_id).await.unwrap();
        tx.commit().await.unwrap();

        let created = sweep_inactive_devices(&store, &RuleConfig::default(), now)
            .await
            .unwrap();
        assert_eq!(created, 0);
    }

    #[tokio::test]
    async fn online_devices_are_never_inactive() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let past = Utc::now() - TimeDelta::hours(48);
        let device_id = seed_device(&store, past).await;

        let created = sweep_inactive_devices(&store, &RuleConfig::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(created, 0);
        assert!(store.alerts_for_device(device_id).await.unwrap().is_empty());
    }
}
