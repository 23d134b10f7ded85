//! Device ledger reconciliation.
//!
//! Diffs one cycle's enriched probe result against the durable registry,
//! applies the transitions, and emits the typed event stream. The diff is
//! a pure function; the apply step commits device writes, events, and the
//! inline alerts as one transaction, so a crash mid-cycle cannot leave a
//! device marked online with no corresponding join event.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};

use netwatch_core::events::{Event, JoinDetails, NewEvent};
use netwatch_core::types::{Device, HardwareId, NewDevice};
use netwatch_store::{alert, device, event, WatchStore};

use crate::enrich::EnrichedObservation;
use crate::error::Result;
use crate::rules;

/// Counts reported back to the orchestrator after a committed cycle.
#[derive(Debug, Clone, Default)]
pub struct ReconcileSummary {
    pub total_devices: i64,
    pub online_devices: i64,
    pub new_devices: i64,
}

/// The committed result of one reconciliation cycle.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub summary: ReconcileSummary,
    /// The cycle's events in emission order, with assigned ids.
    pub events: Vec<Event>,
}

/// Refresh of a device present in both the result and the registry.
#[derive(Debug)]
pub(crate) struct RefreshAction {
    device_id: i64,
    /// device_name if set, else the hardware id; used in alert text.
    label: String,
    was_offline: bool,
    old_address: Option<Ipv4Addr>,
    new_address: Ipv4Addr,
}

impl RefreshAction {
    fn address_changed(&self) -> bool {
        self.old_address != Some(self.new_address)
    }
}

/// The diff between one cycle's observations and the registry.
#[derive(Debug, Default)]
pub(crate) struct ReconcilePlan {
    pub(crate) joins: Vec<EnrichedObservation>,
    pub(crate) refreshes: Vec<RefreshAction>,
    pub(crate) leaves: Vec<i64>,
}

/// Compute the cycle diff.
///
/// A hardware id reported more than once in one sweep collapses to a
/// single observation: last value wins, first position kept. Joins and
/// refreshes come out in observation order, leaves after them — present
/// and absent ids are disjoint, so the two phases cannot touch the same
/// device.
pub(crate) fn plan_reconcile(
    existing: &[Device],
    observed: &[EnrichedObservation],
) -> ReconcilePlan {
    let mut order: Vec<&HardwareId> = Vec::new();
    let mut latest: HashMap<&HardwareId, &EnrichedObservation> = HashMap::new();
    for obs in observed {
        let hardware_id = &obs.observation.hardware_id;
        if latest.insert(hardware_id, obs).is_none() {
            order.push(hardware_id);
        }
    }

    let by_hardware_id: HashMap<&HardwareId, &Device> =
        existing.iter().map(|d| (&d.hardware_id, d)).collect();

    let mut plan = ReconcilePlan::default();

    for hardware_id in order {
        let obs = latest[hardware_id];
        match by_hardware_id.get(hardware_id) {
            None => plan.joins.push((*obs).clone()),
            Some(device) => plan.refreshes.push(RefreshAction {
                device_id: device.id,
                label: device
                    .device_name
                    .clone()
                    .unwrap_or_else(|| device.hardware_id.to_string()),
                was_offline: !device.is_online,
                old_address: device.ip_address,
                new_address: obs.observation.ip,
            }),
        }
    }

    for device in existing {
        if device.is_online && !latest.contains_key(&device.hardware_id) {
            plan.leaves.push(device.id);
        }
    }

    plan
}

/// Apply one cycle's observations to the registry, atomically.
///
/// Either all device/event/alert writes for the cycle are visible or none
/// are; a store failure rolls the whole cycle back and leaves prior
/// committed state untouched.
pub async fn reconcile(
    store: &WatchStore,
    observed: &[EnrichedObservation],
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome> {
    let mut tx = store.begin().await?;

    let existing = device::fetch_all(&mut tx).await?;
    let plan = plan_reconcile(&existing, observed);
    let online_devices = (plan.joins.len() + plan.refreshes.len()) as i64;
    let new_devices = plan.joins.len() as i64;

    let mut events = Vec::new();

    for obs in &plan.joins {
        let new_device = NewDevice {
            hardware_id: obs.observation.hardware_id.clone(),
            ip_address: obs.observation.ip,
            vendor: obs.vendor.clone(),
            hostname: obs.hostname.clone(),
        };
        let device_id = device::insert(&mut tx, &new_device, now).await?;

        let details = JoinDetails::new(
            obs.observation.ip,
            &new_device.hardware_id,
            &obs.vendor,
            obs.hostname.as_deref(),
        );
        let join = NewEvent::join(device_id, &details);
        let event_id = event::insert(&mut tx, &join, now).await?;
        events.push(materialize(event_id, join, now));

        alert::insert(&mut tx, &rules::new_device_alert(device_id, obs), now).await?;

        tracing::info!(
            hardware_id = %new_device.hardware_id,
            ip = %obs.observation.ip,
            vendor = %obs.vendor,
            "New device discovered"
        );
    }

    for refresh in &plan.refreshes {
        device::mark_seen(&mut tx, refresh.device_id, now).await?;

        if refresh.address_changed() {
            device::update_address(&mut tx, refresh.device_id, refresh.new_address).await?;

            let change =
                NewEvent::address_change(refresh.device_id, refresh.old_address, refresh.new_address);
            let event_id = event::insert(&mut tx, &change, now).await?;
            events.push(materialize(event_id, change, now));

            // Not deduplicated: one alert per differing cycle.
            let change_alert = rules::address_change_alert(
                refresh.device_id,
                &refresh.label,
                refresh.old_address,
                refresh.new_address,
            );
            alert::insert(&mut tx, &change_alert, now).await?;

            tracing::info!(
                device_id = refresh.device_id,
                new_ip = %refresh.new_address,
                "Device address changed"
            );
        }

        if refresh.was_offline {
            let reconnect = NewEvent::reconnect(refresh.device_id);
            let event_id = event::insert(&mut tx, &reconnect, now).await?;
            events.push(materialize(event_id, reconnect, now));
        }
    }

    for device_id in &plan.leaves {
        device::mark_offline(&mut tx, *device_id).await?;
        let leave = NewEvent::leave(*device_id);
        let event_id = event::insert(&mut tx, &leave, now).await?;
        events.push(materialize(event_id, leave, now));
    }

    let total_devices = device::count(&mut tx).await?;
    tx.commit().await?;

    Ok(ReconcileOutcome {
        summary: ReconcileSummary {
            total_devices,
            online_devices,
            new_devices,
        },
        events,
    })
}

fn materialize(id: i64, event: NewEvent, timestamp: DateTime<Utc>) -> Event {
    Event {
        id,
        device_id: event.device_id,
        kind: event.kind,
        severity: event.severity,
        description: event.description,
        details: event.details,
        timestamp,
    }
}
