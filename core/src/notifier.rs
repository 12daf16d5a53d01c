//! Notification fan-out (§4.6): routes a `Message` to the sinks named by
//! each alert's profile, plus an always-on "must" set. Grounded on the
//! original's `Notifiers.Notify`/`MustNotify` split.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::alert::{Alert, Message};
use crate::error::Result;
use crate::profile::ProfileCache;

/// Implemented by every outbound sink: webhook (rich-card or plain-text)
/// and the voice caller.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;
    async fn notify(&self, message: &Message) -> Result<()>;
}

/// Fans a `Message` out to routed sinks (looked up per-alert via the
/// profile cache) and to the always-on must-set, mirroring
/// `Notifiers.Notify`/`MustNotify`.
pub struct NotifierRegistry {
    sinks: HashMap<String, Arc<dyn NotificationSink>>,
    musts: Vec<Arc<dyn NotificationSink>>,
    default_sinks: Vec<String>,
    profiles: Arc<ProfileCache>,
}

impl NotifierRegistry {
    pub fn new(profiles: Arc<ProfileCache>, default_sinks: Vec<String>) -> Self {
        NotifierRegistry {
            sinks: HashMap::new(),
            musts: Vec::new(),
            default_sinks,
            profiles,
        }
    }

    /// Register a routed sink, addressable by name from a profile's
    /// `notifiers` list.
    pub fn register(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.insert(sink.name().to_string(), sink);
    }

    /// Register a sink that receives every message regardless of routing.
    pub fn register_must(&mut self, sink: Arc<dyn NotificationSink>) {
        self.musts.push(sink);
    }

    /// Dispatch `message`. The must-set fires detached and unconditionally;
    /// each routed sink fires detached too, once per message, with only the
    /// alerts whose profile named it (or, absent a profile, the configured
    /// defaults). Concurrent and fire-and-forget, exactly like the original
    /// — callers should not await delivery before returning a response to
    /// the alert source.
    pub async fn notify(self: &Arc<Self>, message: Message) {
        {
            let this = Arc::clone(self);
            let message = message.clone();
            tokio::spawn(async move {
                this.notify_musts(&message).await;
            });
        }

        let partitions = self.partition_by_sink(&message).await;
        for (sink_name, alerts) in partitions {
            let Some(sink) = self.sinks.get(&sink_name).cloned() else {
                tracing::warn!(sink = %sink_name, "profile names an unregistered notifier");
                continue;
            };
            let correlation_id = message.correlation_id.clone();
            tokio::spawn(async move {
                let sub_message = Message::new(correlation_id, alerts);
                if let Err(err) = sink.notify(&sub_message).await {
                    tracing::warn!(error = %err, sink = sink.name(), "notification delivery failed");
                }
            });
        }
    }

    async fn notify_musts(&self, message: &Message) {
        for sink in &self.musts {
            if let Err(err) = sink.notify(message).await {
                tracing::warn!(error = %err, sink = sink.name(), "must-notify delivery failed");
            }
        }
    }

    /// Build, per sink name, the ordered sub-list of alerts routed to it.
    /// An alert whose profile is missing falls back to `default_sinks`.
    /// `is_emergent`/need-oncall alerts get the `caller` sink appended even
    /// if not explicitly listed, matching the original's `CallerName`
    /// append rule.
    async fn partition_by_sink(&self, message: &Message) -> Vec<(String, Vec<Alert>)> {
        let mut order: Vec<String> = Vec::new();
        let mut by_sink: HashMap<String, Vec<Alert>> = HashMap::new();

        for alert in &message.alerts {
            let profile = self.profiles.get_by_cache(&alert.alertname).await;
            let mut targets = match &profile {
                Some(p) if !p.notifiers.is_empty() => p.notifiers.clone(),
                _ => self.default_sinks.clone(),
            };

            let needs_oncall = profile.as_ref().is_some_and(|p| p.need_oncall);
            if (alert.is_emergent || needs_oncall) && !targets.iter().any(|t| t == "caller") {
                targets.push("caller".to_string());
            }

            for target in targets {
                let bucket = by_sink.entry(target.clone()).or_insert_with(|| {
                    order.push(target.clone());
                    Vec::new()
                });
                bucket.push(alert.clone());
            }
        }

        order.into_iter().map(|name| (name.clone(), by_sink.remove(&name).unwrap_or_default())).collect()
    }
}
