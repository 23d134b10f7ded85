//! Event log operations.
//!
//! The events table is append-only: nothing in this module (or anywhere in
//! core) updates or deletes a row once written.

use chrono::{DateTime, Utc};
use netwatch_core::events::{Event, EventKind, NewEvent};
use netwatch_core::types::Severity;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::{Result, StoreError};
use crate::{from_epoch, to_epoch};

/// Append one transition to the log.
pub async fn insert(
    conn: &mut SqliteConnection,
    event: &NewEvent,
    timestamp: DateTime<Utc>,
) -> Result<i64> {
    let details = event
        .details
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO events (device_id, kind, severity, description, details, timestamp)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.device_id)
    .bind(event.kind.as_str())
    .bind(event.severity.as_str())
    .bind(&event.description)
    .bind(details)
    .bind(to_epoch(timestamp))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Count events of one kind for a device observed at or after `since`.
pub async fn count_since(
    conn: &mut SqliteConnection,
    device_id: i64,
    kind: EventKind,
    since: DateTime<Utc>,
) -> Result<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM events WHERE device_id = ? AND kind = ? AND timestamp >= ?",
    )
    .bind(device_id)
    .bind(kind.as_str())
    .bind(to_epoch(since))
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.get("n"))
}

/// History for one device, newest first, ties broken by insertion order.
pub async fn fetch_for_device(
    conn: &mut SqliteConnection,
    device_id: i64,
    limit: i64,
) -> Result<Vec<Event>> {
    let rows = sqlx::query(
        "SELECT * FROM events WHERE device_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
    )
    .bind(device_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_event).collect()
}

fn row_to_event(row: &SqliteRow) -> Result<Event> {
    let kind_str: String = row.get("kind");
    let kind = EventKind::parse(&kind_str)
        .ok_or_else(|| StoreError::invalid_row(format!("unknown event kind: {kind_str}")))?;

    let severity_str: String = row.get("severity");
    let severity = Severity::parse(&severity_str)
        .ok_or_else(|| StoreError::invalid_row(format!("unknown severity: {severity_str}")))?;

    let details = row
        .get::<Option<String>, _>("details")
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?;

    Ok(Event {
        id: row.get("id"),
        device_id: row.get("device_id"),
        kind,
        severity,
        description: row.get("description"),
        details,
        timestamp: from_epoch(row.get("timestamp")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device, WatchStore};
    use chrono::TimeDelta;
    use netwatch_core::events::JoinDetails;
    use netwatch_core::types::{HardwareId, NewDevice};

    async fn seed_device(store: &WatchStore, now: DateTime<Utc>) -> i64 {
        let mut tx = store.begin().await.unwrap();
        let id = device::insert(
            &mut tx,
            &NewDevice {
                hardware_id: HardwareId::parse("aa:bb:cc:dd:ee:ff").unwrap(),
                ip_address: "10.0.0.5".parse().unwrap(),
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

    #[tokio::test]
    async fn join_details_roundtrip() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let now = Utc::now();
        let device_id = seed_device(&store, now).await;

        let hw = HardwareId::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let details = JoinDetails::new("10.0.0.5".parse().unwrap(), &hw, "Acme", None);

        let mut tx = store.begin().await.unwrap();
        insert(&mut tx, &NewEvent::join(device_id, &details), now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let events = store.events_for_device(device_id, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::DeviceJoin);
        let payload = events[0].details.as_ref().unwrap();
        assert_eq!(payload["mac"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(payload["vendor"], "Acme");
    }

    #[tokio::test]
    async fn count_since_is_window_bounded() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let base = Utc::now() - TimeDelta::seconds(10_000);
        let device_id = seed_device(&store, base).await;

        let mut tx = store.begin().await.unwrap();
        for offset in [0, 600, 1200, 1800, 2400] {
            insert(
                &mut tx,
                &NewEvent::reconnect(device_id),
                base + TimeDelta::seconds(offset),
            )
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let mut conn = store.pool().acquire().await.unwrap();
        let all = count_since(&mut conn, device_id, EventKind::DeviceReconnect, base)
            .await
            .unwrap();
        assert_eq!(all, 5);

        let tail = count_since(
            &mut conn,
            device_id,
            EventKind::DeviceReconnect,
            base + TimeDelta::seconds(601),
        )
        .await
        .unwrap();
        assert_eq!(tail, 3);
    }

    #[tokio::test]
    async fn history_is_newest_first_with_insertion_tiebreak() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let now = Utc::now();
        let device_id = seed_device(&store, now).await;

        let mut tx = store.begin().await.unwrap();
        insert(&mut tx, &NewEvent::reconnect(device_id), now).await.unwrap();
        insert(&mut tx, &NewEvent::leave(device_id), now).await.unwrap();
        tx.commit().await.unwrap();

        let events = store.events_for_device(device_id, 10).await.unwrap();
        assert_eq!(events.len(), 2);
        // Same timestamp: later insertion first.
        assert_eq!(events[0].kind, EventKind::DeviceLeave);
        assert_eq!(events[1].kind, EventKind::DeviceReconnect);
    }
}
