//! netwatch-store: transactional SQLite store for the NetWatch ledger.
//!
//! This crate is the single mutation point for the persisted entities
//! (Device, Event, Alert). Per-entity operations take an explicit
//! `&mut SqliteConnection` so a reconciliation cycle's writes can share one
//! transaction; `WatchStore` methods cover the pool-scoped reads and the
//! status/metadata edits the external presentation layer performs.

mod error;
mod schema;

pub mod alert;
pub mod device;
pub mod event;

pub use error::{Result, StoreError};

use std::path::Path;

use chrono::{DateTime, Utc};
use netwatch_core::types::{Alert, AlertStatus, Device, HardwareId};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

/// Seconds-precision epoch value stored in timestamp columns.
pub(crate) fn to_epoch(ts: DateTime<Utc>) -> i64 {
    ts.timestamp()
}

pub(crate) fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Handle to the NetWatch database.
///
/// Clone is cheap (inner pool Arc).
#[derive(Clone)]
pub struct WatchStore {
    pool: SqlitePool,
}

impl WatchStore {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        tracing::info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Open an in-memory database, for tests.
    ///
    /// Capped at one connection: each in-memory SQLite connection is its
    /// own database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Begin a transaction scoping one atomic unit of writes.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Get the underlying connection pool (escape hatch for the external
    /// reporting layer; prefer the typed methods).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ── Pool-scoped reads ─────────────────────────────────────────

    pub async fn devices(&self) -> Result<Vec<Device>> {
        let mut conn = self.pool.acquire().await?;
        device::fetch_all(&mut conn).await
    }

    pub async fn device_by_hardware_id(&self, hardware_id: &HardwareId) -> Result<Option<Device>> {
        let mut conn = self.pool.acquire().await?;
        device::fetch_by_hardware_id(&mut conn, hardware_id).await
    }

    pub async fn events_for_device(
        &self,
        device_id: i64,
        limit: i64,
    ) -> Result<Vec<netwatch_core::events::Event>> {
        let mut conn = self.pool.acquire().await?;
        event::fetch_for_device(&mut conn, device_id, limit).await
    }

    pub async fn active_alerts(&self) -> Result<Vec<Alert>> {
        let mut conn = self.pool.acquire().await?;
        alert::fetch_active(&mut conn).await
    }

    pub async fn alerts_for_device(&self, device_id: i64) -> Result<Vec<Alert>> {
        let mut conn = self.pool.acquire().await?;
        alert::fetch_for_device(&mut conn, device_id).await
    }

    // ── External-collaborator edits ───────────────────────────────
    //
    // Triage and inventory metadata operations performed by the
    // presentation layer; reconciliation never calls these.

    pub async fn set_alert_status(&self, alert_id: i64, status: AlertStatus) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        alert::set_status(&mut conn, alert_id, status).await
    }

    pub async fn set_device_name(&self, device_id: i64, name: Option<&str>) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        device::set_name(&mut conn, device_id, name).await
    }

    pub async fn set_device_trusted(&self, device_id: i64, trusted: bool) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        device::set_trusted(&mut conn, device_id, trusted).await
    }

    pub async fn set_device_risk_score(&self, device_id: i64, score: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        device::set_risk_score(&mut conn, device_id, score).await
    }
}
