//! Device row operations.
//!
//! Write operations take an explicit `&mut SqliteConnection` so the ledger
//! can scope one reconciliation cycle's writes to a single transaction.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use netwatch_core::types::{Device, HardwareId, NewDevice, DEFAULT_RISK_SCORE};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::{Result, StoreError};
use crate::{from_epoch, to_epoch};

/// Create a device on first observation: online, untrusted, default risk.
pub async fn insert(
    conn: &mut SqliteConnection,
    device: &NewDevice,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO devices (hardware_id, ip_address, vendor, hostname, is_trusted, risk_score, is_online, first_seen, last_seen)
        VALUES (?, ?, ?, ?, 0, ?, 1, ?, ?)
        "#,
    )
    .bind(device.hardware_id.as_str())
    .bind(device.ip_address.to_string())
    .bind(&device.vendor)
    .bind(&device.hostname)
    .bind(DEFAULT_RISK_SCORE)
    .bind(to_epoch(now))
    .bind(to_epoch(now))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn fetch_all(conn: &mut SqliteConnection) -> Result<Vec<Device>> {
    let rows = sqlx::query("SELECT * FROM devices ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(row_to_device).collect()
}

pub async fn fetch_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Device>> {
    let row = sqlx::query("SELECT * FROM devices WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_device).transpose()
}

pub async fn fetch_by_hardware_id(
    conn: &mut SqliteConnection,
    hardware_id: &HardwareId,
) -> Result<Option<Device>> {
    let row = sqlx::query("SELECT * FROM devices WHERE hardware_id = ?")
        .bind(hardware_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_device).transpose()
}

/// Offline devices whose last observation predates the cutoff.
pub async fn fetch_inactive(
    conn: &mut SqliteConnection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Device>> {
    let rows = sqlx::query("SELECT * FROM devices WHERE is_online = 0 AND last_seen < ? ORDER BY id")
        .bind(to_epoch(cutoff))
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(row_to_device).collect()
}

pub async fn count(conn: &mut SqliteConnection) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM devices")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("n"))
}

/// Mark a device observed: online, last_seen advanced.
///
/// last_seen is monotonically non-decreasing.
pub async fn mark_seen(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE devices SET is_online = 1, last_seen = MAX(last_seen, ?) WHERE id = ?")
        .bind(to_epoch(now))
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn update_address(
    conn: &mut SqliteConnection,
    id: i64,
    ip_address: Ipv4Addr,
) -> Result<()> {
    sqlx::query("UPDATE devices SET ip_address = ? WHERE id = ?")
        .bind(ip_address.to_string())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn mark_offline(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    sqlx::query("UPDATE devices SET is_online = 0 WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ── External-collaborator edits ───────────────────────────────────

pub async fn set_name(conn: &mut SqliteConnection, id: i64, name: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE devices SET device_name = ? WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_trusted(conn: &mut SqliteConnection, id: i64, trusted: bool) -> Result<()> {
    sqlx::query("UPDATE devices SET is_trusted = ? WHERE id = ?")
        .bind(trusted)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_risk_score(conn: &mut SqliteConnection, id: i64, score: i64) -> Result<()> {
    if !(0..=100).contains(&score) {
        return Err(StoreError::constraint(format!(
            "risk score out of range: {score}"
        )));
    }
    sqlx::query("UPDATE devices SET risk_score = ? WHERE id = ?")
        .bind(score)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn row_to_device(row: &SqliteRow) -> Result<Device> {
    let hardware_id = HardwareId::parse(&row.get::<String, _>("hardware_id"))
        .map_err(|e| StoreError::invalid_row(e.to_string()))?;
    let ip_address = row
        .get::<Option<String>, _>("ip_address")
        .map(|s| s.parse::<Ipv4Addr>())
        .transpose()
        .map_err(|e| StoreError::invalid_row(format!("ip_address: {e}")))?;

    Ok(Device {
        id: row.get("id"),
        hardware_id,
        ip_address,
        device_name: row.get("device_name"),
        vendor: row.get("vendor"),
        hostname: row.get("hostname"),
        is_trusted: row.get("is_trusted"),
        risk_score: row.get("risk_score"),
        is_online: row.get("is_online"),
        first_seen: from_epoch(row.get("first_seen")),
        last_seen: from_epoch(row.get("last_seen")),
    })
}
