//! The history-store external contract (§4.3). `server`/`store` provide
//! the concrete SQLite-backed implementation; `core` only depends on this
//! trait so the escalation engine never needs to know about SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alert::{Ack, Alert, AlertStatus};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AlertHistoryUpdate {
    pub status: AlertStatus,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub alertname: Option<String>,
    pub fingerprint: Option<String>,
    pub begin: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub marker: Option<String>,
    pub limit: i64,
}

impl HistoryQuery {
    /// Clamp to `[1, 1000]`, per §4.3.
    pub fn clamped_limit(&self) -> i64 {
        self.limit.clamp(1, 1000)
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a new history record. `alert.id` is assigned by the store on
    /// success. Fails with `Duplicate` if `alert.id` is already set and
    /// collides.
    async fn create(&self, alert: &mut Alert) -> Result<()>;

    /// Set `status`/`ends_at` on an existing record. `NotFound` if `id`
    /// doesn't exist.
    async fn update(&self, id: &str, update: &AlertHistoryUpdate) -> Result<()>;

    /// Set `status = acked` and append `ack`.
    async fn ack(&self, id: &str, ack: &Ack) -> Result<()>;

    /// Rewrite `alertname` (and re-derived fingerprint) for every record
    /// currently under `old`.
    async fn rename(&self, old: &str, new: &str) -> Result<()>;

    /// Paginated, descending by id, with a `marker` cursor.
    async fn list(&self, query: &HistoryQuery) -> Result<(Vec<Alert>, Option<String>)>;
}
