//! The ingest-to-notify glue (§4.10). Grounded on `main.go`'s `Service`:
//! alerts come in, get normalized and deduplicated through the active-alert
//! table, get a chance to run analyzers, and go out over a bounded channel
//! that the notifier fan-out consumes.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::active::ActiveAlertManager;
use crate::alert::{Alert, Message};
use crate::analyzer::Analyzer;
use crate::error::Result;

/// Normalize-and-dedup a batch of alerts (sorted by `starts_at` so older
/// alerts are processed, and therefore notified, first), run any analyzer
/// that opts in, and push the resulting message onto `sender`. Mirrors the
/// original's ingest-then-fan-out pipeline.
pub async fn dispatch(
    active: &Arc<ActiveAlertManager>,
    analyzers: &[Arc<dyn Analyzer>],
    correlation_id: String,
    mut alerts: Vec<Alert>,
    sender: &mpsc::Sender<Message>,
) -> Result<()> {
    alerts.sort_by_key(|a| a.starts_at);

    let mut to_notify = Vec::with_capacity(alerts.len());
    for alert in alerts {
        let Some(mut normalized) = active.do_ingest(alert, correlation_id.clone()).await? else {
            continue;
        };

        let matching: Vec<&Arc<dyn Analyzer>> = analyzers.iter().filter(|a| a.should_run(&normalized.alertname)).collect();
        if !matching.is_empty() {
            let results = futures::future::join_all(matching.iter().map(|a| a.run(&normalized.alertname, &normalized.id))).await;
            for (analyzer, result) in matching.iter().zip(results) {
                if let Err(err) = result {
                    tracing::warn!(error = %err, analyzer = analyzer.kind(), alertname = %normalized.alertname, "analyzer run failed");
                } else {
                    normalized.analyzer_tags.push(analyzer.kind().to_string());
                }
            }
        }

        to_notify.push(normalized);
    }

    if to_notify.is_empty() {
        return Ok(());
    }

    let message = Message::new(correlation_id, to_notify);
    if sender.send(message).await.is_err() {
        tracing::warn!("dispatch send failed: notifier channel closed");
    }
    Ok(())
}
