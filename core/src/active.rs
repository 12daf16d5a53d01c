//! The active-alert table and escalation engine (§4.5). Grounded on the
//! original's `AlertActiveMgr`/`DoEmergenct`: one cancellable task per
//! tracked alert drives `waiting -> emergent-resending -> stopped`, and the
//! whole table is snapshotted to disk on a timer via `C2`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::alert::{Ack, Alert, AlertStatus, Message, Severity};
use crate::error::Result;
use crate::history::{AlertHistoryUpdate, HistoryStore};
use crate::snapshot;

fn default_emergency_interval_s() -> i64 {
    2 * 60 * 60
}

fn default_resend_interval_s() -> i64 {
    30 * 60
}

fn default_backup_file() -> String {
    "run/active.data".to_string()
}

fn default_backup_interval_ms() -> i64 {
    60 * 1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertActiveConfig {
    #[serde(default = "default_emergency_interval_s")]
    pub emergency_interval_s: i64,
    #[serde(default = "default_resend_interval_s")]
    pub resend_interval_s: i64,
    #[serde(default = "default_backup_file")]
    pub backup_file: String,
    #[serde(default = "default_backup_interval_ms")]
    pub backup_interval_ms: i64,
}

impl Default for AlertActiveConfig {
    fn default() -> Self {
        AlertActiveConfig {
            emergency_interval_s: default_emergency_interval_s(),
            resend_interval_s: default_resend_interval_s(),
            backup_file: default_backup_file(),
            backup_interval_ms: default_backup_interval_ms(),
        }
    }
}

impl AlertActiveConfig {
    pub fn emergency_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.emergency_interval_s.max(0) as u64)
    }

    pub fn resend_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.resend_interval_s.max(0) as u64)
    }

    pub fn backup_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.backup_interval_ms.max(0) as u64)
    }
}

struct ActiveEntry {
    alert: Alert,
    correlation_id: String,
    cancel: CancellationToken,
}

/// What actually gets persisted; the cancellation token is re-created fresh
/// on every load, never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActiveEntrySnapshot {
    alert: Alert,
    correlation_id: String,
}

pub struct ActiveAlertManager {
    config: AlertActiveConfig,
    history: Arc<dyn HistoryStore>,
    sender: mpsc::Sender<Message>,
    table: Mutex<HashMap<String, ActiveEntry>>,
    snapshot_path: PathBuf,
}

impl ActiveAlertManager {
    /// Build the manager and, if a snapshot exists at `snapshot_path`,
    /// restore the active table from it. A loaded entry already in
    /// `Acked` status is restored without restarting its escalation task
    /// (it already ran to completion before the restart); every other
    /// loaded entry gets a fresh escalation task.
    pub async fn load(
        config: AlertActiveConfig,
        history: Arc<dyn HistoryStore>,
        sender: mpsc::Sender<Message>,
        snapshot_path: PathBuf,
    ) -> Result<Arc<Self>> {
        let mgr = Arc::new(ActiveAlertManager {
            config,
            history,
            sender,
            table: Mutex::new(HashMap::new()),
            snapshot_path,
        });

        if let Some(saved) = snapshot::load::<HashMap<String, ActiveEntrySnapshot>>(&mgr.snapshot_path).await? {
            let mut to_spawn = Vec::new();
            {
                let mut table = mgr.table.lock().await;
                for (fingerprint, snap) in saved {
                    let cancel = CancellationToken::new();
                    let needs_escalation = snap.alert.status != AlertStatus::Acked;
                    table.insert(
                        fingerprint.clone(),
                        ActiveEntry {
                            alert: snap.alert,
                            correlation_id: snap.correlation_id,
                            cancel: cancel.clone(),
                        },
                    );
                    if needs_escalation {
                        to_spawn.push((fingerprint, cancel));
                    }
                }
            }
            for (fingerprint, cancel) in to_spawn {
                spawn_escalation(Arc::clone(&mgr), fingerprint, cancel);
            }
        }

        Ok(mgr)
    }

    /// Spawn the periodic snapshot-backup task. Detach the handle or hold it
    /// to abort on shutdown.
    pub fn spawn_backup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let interval = this.config.backup_interval();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = this.save_snapshot().await {
                    tracing::warn!(error = %err, "active-table snapshot backup failed");
                }
            }
        })
    }

    pub async fn save_snapshot(&self) -> Result<()> {
        let table = self.table.lock().await;
        let snapshot: HashMap<String, ActiveEntrySnapshot> = table
            .iter()
            .map(|(fp, entry)| {
                (
                    fp.clone(),
                    ActiveEntrySnapshot {
                        alert: entry.alert.clone(),
                        correlation_id: entry.correlation_id.clone(),
                    },
                )
            })
            .collect();
        drop(table);
        snapshot::save(&snapshot, &self.snapshot_path).await
    }

    /// Ingest one normalized alert per the table in §4.5:
    /// - not `need_handle`: write-through history only, always notify.
    /// - firing, not tracked: create history record, start tracking +
    ///   escalation, notify.
    /// - firing, already tracked: ignored, no notification.
    /// - resolved, tracked: close out history, stop escalation, notify.
    /// - resolved, not tracked: silently dropped.
    pub async fn do_ingest(self: &Arc<Self>, mut alert: Alert, correlation_id: String) -> Result<Option<Alert>> {
        if !alert.need_handle {
            if let Err(err) = self.history.create(&mut alert).await {
                tracing::warn!(error = %err, alertname = %alert.alertname, "history create failed for passthrough alert");
            }
            return Ok(Some(alert));
        }

        match alert.status {
            AlertStatus::Firing => {
                {
                    let table = self.table.lock().await;
                    if table.contains_key(&alert.fingerprint) {
                        return Ok(None);
                    }
                }

                if let Err(err) = self.history.create(&mut alert).await {
                    tracing::warn!(error = %err, alertname = %alert.alertname, "history create failed for new active alert");
                }

                let cancel = CancellationToken::new();
                {
                    let mut table = self.table.lock().await;
                    if table.contains_key(&alert.fingerprint) {
                        // Another ingest won the race between the first
                        // check and the history write. Drop ours.
                        return Ok(None);
                    }
                    table.insert(
                        alert.fingerprint.clone(),
                        ActiveEntry {
                            alert: alert.clone(),
                            correlation_id: correlation_id.clone(),
                            cancel: cancel.clone(),
                        },
                    );
                }
                spawn_escalation(Arc::clone(self), alert.fingerprint.clone(), cancel);
                Ok(Some(alert))
            }
            AlertStatus::Resolved => {
                let removed = self.table.lock().await.remove(&alert.fingerprint);
                let Some(entry) = removed else {
                    return Ok(None);
                };
                entry.cancel.cancel();

                let ends_at = alert.ends_at.unwrap_or_else(Utc::now);
                let update = AlertHistoryUpdate {
                    status: AlertStatus::Resolved,
                    ends_at: Some(ends_at),
                };
                if let Err(err) = self.history.update(&entry.alert.id, &update).await {
                    tracing::warn!(error = %err, fingerprint = %alert.fingerprint, "history update failed on resolve");
                }

                alert.id = entry.alert.id;
                alert.ends_at = Some(ends_at);
                // Presented as a resolution, regardless of the severity it
                // fired with.
                alert.severity = Severity::Success;
                alert.display_severity = Severity::Success;
                Ok(Some(alert))
            }
            AlertStatus::Acked => Ok(None),
        }
    }

    /// Ack every tracked alert whose `alertname` is in `alertnames` or
    /// whose history id is in `ids`, stopping their escalation tasks.
    pub async fn ack(&self, alertnames: &[String], ids: &[String], ack: Ack) -> Result<Vec<Alert>> {
        let mut acked = Vec::new();
        {
            let mut table = self.table.lock().await;
            for entry in table.values_mut() {
                if alertnames.contains(&entry.alert.alertname) || ids.contains(&entry.alert.id) {
                    entry.cancel.cancel();
                    entry.alert.status = AlertStatus::Acked;
                    entry.alert.acks.push(ack.clone());
                    acked.push(entry.alert.clone());
                }
            }
        }
        for alert in &acked {
            if let Err(err) = self.history.ack(&alert.id, &ack).await {
                tracing::warn!(error = %err, id = %alert.id, "history ack failed");
            }
        }
        Ok(acked)
    }

    pub async fn delete(&self, fingerprint: &str) -> Option<Alert> {
        let removed = self.table.lock().await.remove(fingerprint);
        removed.map(|entry| {
            entry.cancel.cancel();
            entry.alert
        })
    }

    pub async fn get(&self, fingerprint: &str) -> Option<Alert> {
        self.table.lock().await.get(fingerprint).map(|e| e.alert.clone())
    }

    pub async fn list(&self) -> Vec<Alert> {
        self.table.lock().await.values().map(|e| e.alert.clone()).collect()
    }
}

fn emergent_left(starts_at: chrono::DateTime<Utc>, emergency_interval: StdDuration) -> StdDuration {
    let elapsed = Utc::now()
        .signed_duration_since(starts_at)
        .to_std()
        .unwrap_or(StdDuration::ZERO);
    emergency_interval.checked_sub(elapsed).unwrap_or(StdDuration::ZERO)
}

fn spawn_escalation(mgr: Arc<ActiveAlertManager>, fingerprint: String, cancel: CancellationToken) {
    tokio::spawn(async move {
        run_escalation(mgr, fingerprint, cancel).await;
    });
}

/// `waiting -> emergent-resending -> stopped`. Waits out the emergency
/// grace period (or returns early if acked/resolved/deleted cancels us
/// first); once the grace period elapses, marks the alert emergent, emits
/// one notification immediately, then emits one more on every
/// `resend_interval` tick until cancelled.
async fn run_escalation(mgr: Arc<ActiveAlertManager>, fingerprint: String, cancel: CancellationToken) {
    let (starts_at, correlation_id, status) = {
        let table = mgr.table.lock().await;
        match table.get(&fingerprint) {
            Some(entry) => (entry.alert.starts_at, entry.correlation_id.clone(), entry.alert.status),
            None => return,
        }
    };
    if status == AlertStatus::Acked {
        return;
    }

    let wait = emergent_left(starts_at, mgr.config.emergency_interval());
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = time::sleep(wait) => {}
    }

    let Some(alert) = mark_emergent(&mgr, &fingerprint).await else {
        return;
    };
    emit(&mgr, correlation_id.clone(), alert).await;

    let mut ticker = time::interval(mgr.config.resend_interval());
    ticker.tick().await; // first tick fires immediately; we already emitted above
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let Some(alert) = mgr.get(&fingerprint).await else { return };
                emit(&mgr, correlation_id.clone(), alert).await;
            }
        }
    }
}

async fn mark_emergent(mgr: &Arc<ActiveAlertManager>, fingerprint: &str) -> Option<Alert> {
    let mut table = mgr.table.lock().await;
    let entry = table.get_mut(fingerprint)?;
    entry.alert.is_emergent = true;
    Some(entry.alert.clone())
}

async fn emit(mgr: &Arc<ActiveAlertManager>, correlation_id: String, alert: Alert) {
    let message = Message::single(correlation_id, alert);
    if mgr.sender.send(message).await.is_err() {
        tracing::warn!("escalation emit dropped: send channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertForDefault, Severity as Sev};
    use crate::history::HistoryQuery;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeHistory {
        next_id: StdMutex<u64>,
        updates: StdMutex<Vec<(String, AlertHistoryUpdate)>>,
    }

    #[async_trait]
    impl HistoryStore for FakeHistory {
        async fn create(&self, alert: &mut Alert) -> Result<()> {
            let mut next_id = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            *next_id += 1;
            alert.id = next_id.to_string();
            Ok(())
        }

        async fn update(&self, id: &str, update: &AlertHistoryUpdate) -> Result<()> {
            self.updates
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((id.to_string(), update.clone()));
            Ok(())
        }

        async fn ack(&self, _id: &str, _ack: &Ack) -> Result<()> {
            Ok(())
        }

        async fn rename(&self, _old: &str, _new: &str) -> Result<()> {
            Ok(())
        }

        async fn list(&self, _query: &HistoryQuery) -> Result<(Vec<Alert>, Option<String>)> {
            Ok((Vec::new(), None))
        }
    }

    fn firing_alert(alertname: &str) -> Alert {
        Alert::from_default(AlertForDefault {
            alertname: alertname.to_string(),
            desc: "desc".to_string(),
            status: AlertStatus::Firing,
            severity: Sev::Critical,
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: String::new(),
            labels: HashMap::new(),
            need_handle: true,
        })
    }

    async fn manager() -> Arc<ActiveAlertManager> {
        let (tx, _rx) = mpsc::channel(16);
        let dir = tempfile::tempdir().unwrap();
        ActiveAlertManager::load(
            AlertActiveConfig::default(),
            Arc::new(FakeHistory::default()),
            tx,
            dir.path().join("active.json"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn firing_then_firing_is_deduplicated() {
        let mgr = manager().await;
        let alert = firing_alert("disk_full");

        let first = mgr.do_ingest(alert.clone(), "c1".to_string()).await.unwrap();
        assert!(first.is_some());

        let second = mgr.do_ingest(alert, "c2".to_string()).await.unwrap();
        assert!(second.is_none());
        assert_eq!(mgr.list().await.len(), 1);
    }

    #[tokio::test]
    async fn resolved_without_tracking_is_dropped() {
        let mgr = manager().await;
        let mut alert = firing_alert("ghost");
        alert.status = AlertStatus::Resolved;

        let result = mgr.do_ingest(alert, "c1".to_string()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn resolved_after_firing_stops_tracking_and_forces_success_severity() {
        let mgr = manager().await;
        let alert = firing_alert("cpu_high");

        mgr.do_ingest(alert.clone(), "c1".to_string()).await.unwrap();
        assert_eq!(mgr.list().await.len(), 1);

        let mut resolved = alert;
        resolved.status = AlertStatus::Resolved;
        let notified = mgr.do_ingest(resolved, "c1".to_string()).await.unwrap().unwrap();

        assert_eq!(notified.severity, Sev::Success);
        assert_eq!(notified.display_severity, Sev::Success);
        assert!(mgr.list().await.is_empty());
    }

    #[tokio::test]
    async fn passthrough_alerts_are_never_tracked() {
        let mgr = manager().await;
        let mut alert = firing_alert("metric_only");
        alert.need_handle = false;

        let notified = mgr.do_ingest(alert, "c1".to_string()).await.unwrap();
        assert!(notified.is_some());
        assert!(mgr.list().await.is_empty());
    }

    #[tokio::test]
    async fn ack_stops_escalation_and_marks_status() {
        let mgr = manager().await;
        let alert = firing_alert("mem_leak");
        mgr.do_ingest(alert.clone(), "c1".to_string()).await.unwrap();

        let ack = Ack {
            username: "op".to_string(),
            comment: "looking".to_string(),
            time: Utc::now(),
        };
        let acked = mgr.ack(&[alert.alertname.clone()], &[], ack).await.unwrap();
        assert_eq!(acked.len(), 1);
        assert_eq!(acked[0].status, AlertStatus::Acked);

        let tracked = mgr.get(&alert.fingerprint).await.unwrap();
        assert_eq!(tracked.status, AlertStatus::Acked);
    }

    #[tokio::test]
    async fn snapshot_round_trips_active_table() {
        let mgr = manager().await;
        let alert = firing_alert("disk_io");
        mgr.do_ingest(alert.clone(), "c1".to_string()).await.unwrap();
        mgr.save_snapshot().await.unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let restored = ActiveAlertManager::load(
            AlertActiveConfig::default(),
            Arc::new(FakeHistory::default()),
            tx,
            mgr.snapshot_path.clone(),
        )
        .await
        .unwrap();

        assert_eq!(restored.list().await.len(), 1);
    }
}
