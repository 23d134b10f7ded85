//! Alert operations.
//!
//! The rule engine creates alerts; the external triage layer transitions
//! their status. Core logic never deletes an alert. The dedup key for the
//! deduplicated alert kinds is (device, kind, status = active), and
//! `insert_if_no_active` re-validates it inside the caller's transaction so
//! two concurrent evaluators cannot both insert.

use chrono::{DateTime, Utc};
use netwatch_core::types::{Alert, AlertKind, AlertStatus, NewAlert, Severity};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::{Result, StoreError};
use crate::{from_epoch, to_epoch};

/// Create an alert; status starts as `active`.
pub async fn insert(
    conn: &mut SqliteConnection,
    alert: &NewAlert,
    triggered_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO alerts (device_id, kind, severity, title, description, status, triggered_at)
        VALUES (?, ?, ?, ?, ?, 'active', ?)
        "#,
    )
    .bind(alert.device_id)
    .bind(alert.kind.as_str())
    .bind(alert.severity.as_str())
    .bind(&alert.title)
    .bind(&alert.description)
    .bind(to_epoch(triggered_at))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Whether an active alert of this kind already exists for the device.
pub async fn has_active(
    conn: &mut SqliteConnection,
    device_id: i64,
    kind: AlertKind,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT 1 AS hit FROM alerts WHERE device_id = ? AND kind = ? AND status = 'active' LIMIT 1",
    )
    .bind(device_id)
    .bind(kind.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.is_some())
}

/// Create an alert unless an active one of the same kind already exists.
///
/// Check and insert run on the caller's connection, so wrapping the call in
/// a transaction makes the dedup decision atomic; losing the race skips
/// creation, it is not an error.
pub async fn insert_if_no_active(
    conn: &mut SqliteConnection,
    alert: &NewAlert,
    triggered_at: DateTime<Utc>,
) -> Result<Option<i64>> {
    if has_active(conn, alert.device_id, alert.kind).await? {
        return Ok(None);
    }
    Ok(Some(insert(conn, alert, triggered_at).await?))
}

pub async fn fetch_for_device(conn: &mut SqliteConnection, device_id: i64) -> Result<Vec<Alert>> {
    let rows = sqlx::query(
        "SELECT * FROM alerts WHERE device_id = ? ORDER BY triggered_at DESC, id DESC",
    )
    .bind(device_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(row_to_alert).collect()
}

pub async fn fetch_active(conn: &mut SqliteConnection) -> Result<Vec<Alert>> {
    let rows =
        sqlx::query("SELECT * FROM alerts WHERE status = 'active' ORDER BY triggered_at DESC, id DESC")
            .fetch_all(&mut *conn)
            .await?;
    rows.iter().map(row_to_alert).collect()
}

/// Status transition performed by the external triage layer.
pub async fn set_status(
    conn: &mut SqliteConnection,
    alert_id: i64,
    status: AlertStatus,
) -> Result<()> {
    let result = sqlx::query("UPDATE alerts SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(alert_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("alert {alert_id}")));
    }
    Ok(())
}

fn row_to_alert(row: &SqliteRow) -> Result<Alert> {
    let kind_str: String = row.get("kind");
    let kind = AlertKind::parse(&kind_str)
        .ok_or_else(|| StoreError::invalid_row(format!("unknown alert kind: {kind_str}")))?;

    let severity_str: String = row.get("severity");
    let severity = Severity::parse(&severity_str)
        .ok_or_else(|| StoreError::invalid_row(format!("unknown severity: {severity_str}")))?;

    let status_str: String = row.get("status");
    let status = AlertStatus::parse(&status_str)
        .ok_or_else(|| StoreError::invalid_row(format!("unknown alert status: {status_str}")))?;

    Ok(Alert {
        id: row.get("id"),
        device_id: row.get("device_id"),
        kind,
        severity,
        title: row.get("title"),
        description: row.get("description"),
        status,
        triggered_at: from_epoch(row.get("triggered_at")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device, WatchStore};
    use netwatch_core::types::{HardwareId, NewDevice};

    fn inactive_alert(device_id: i64) -> NewAlert {
        NewAlert {
            device_id,
            kind: AlertKind::DeviceInactive,
            severity: Severity::Low,
            title: "Device Inactive".to_string(),
            description: "Device has been offline for more than 24 hours".to_string(),
        }
    }

    async fn seed_device(store: &WatchStore) -> i64 {
        let mut tx = store.begin().await.unwrap();
        let id = device::insert(
            &mut tx,
            &NewDevice {
                hardware_id: HardwareId::parse("aa:bb:cc:00:00:09").unwrap(),
                ip_address: "10.0.0.9".parse().unwrap(),
                vendor: "Acme".to_string(),
                hostname: None,
            },
            Utc::now(),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn dedup_skips_second_active_alert_of_same_kind() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let device_id = seed_device(&store).await;
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        let first = insert_if_no_active(&mut tx, &inactive_alert(device_id), now)
            .await
            .unwrap();
        let second = insert_if_no_active(&mut tx, &inactive_alert(device_id), now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(store.alerts_for_device(device_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolving_reopens_the_dedup_key() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let device_id = seed_device(&store).await;
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        let first = insert_if_no_active(&mut tx, &inactive_alert(device_id), now)
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();

        store
            .set_alert_status(first, AlertStatus::Resolved)
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let second = insert_if_no_active(&mut tx, &inactive_alert(device_id), now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(second.is_some());
        let alerts = store.alerts_for_device(device_id).await.unwrap();
        assert_eq!(alerts.len(), 2);
    }

    #[tokio::test]
    async fn set_status_on_missing_alert_is_not_found() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let result = store.set_alert_status(999, AlertStatus::Acknowledged).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn active_listing_excludes_non_active() {
        let store = WatchStore::open_in_memory().await.unwrap();
        let device_id = seed_device(&store).await;
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        let a = insert(&mut tx, &inactive_alert(device_id), now).await.unwrap();
        insert(
            &mut tx,
            &NewAlert {
                device_id,
                kind: AlertKind::NewDevice,
                severity: Severity::High,
                title: "New Device Detected".to_string(),
                description: "Unknown device joined network".to_string(),
            },
            now,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        store.set_alert_status(a, AlertStatus::Acknowledged).await.unwrap();

        let active = store.active_alerts().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, AlertKind::NewDevice);
    }
}
