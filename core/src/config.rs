//! The top-level configuration shape (§6), deserialized from the server's
//! config file. `core` owns this so the escalation engine and the binary
//! agree on what a field means; unknown keys are accepted rather than
//! rejected, matching the original's tolerant config loading.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::active::AlertActiveConfig;
use crate::caller::VoiceCallerConfig;

fn default_msg_backlog() -> usize {
    256
}

fn default_bind_host() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_debug_level() -> String {
    "info".to_string()
}

fn default_profile_reload_ms() -> i64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    #[serde(default)]
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlertsProfileConfig {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_profile_reload_ms")]
    pub auto_reload_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DutyConfig {
    #[serde(default)]
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifiersConfig {
    /// Sink names used when an alert's profile doesn't list any.
    #[serde(default)]
    pub default_sinks: Vec<String>,
    /// Sink names that always receive every message.
    #[serde(default)]
    pub must_sinks: Vec<String>,
    #[serde(default)]
    pub card_webhooks: Vec<crate::webhook::CardWebhookConfig>,
    #[serde(default)]
    pub plain_text_webhooks: Vec<crate::webhook::PlainTextWebhookConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub sg_forward: Option<crate::analyzer::ForwardingAnalyzerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_msg_backlog")]
    pub msg_backlog: usize,
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_debug_level")]
    pub debug_level: String,
    #[serde(default)]
    pub alert_active: AlertActiveConfig,
    #[serde(default)]
    pub caller: VoiceCallerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub alerts_profile: AlertsProfileConfig,
    #[serde(default)]
    pub duty: DutyConfig,
    #[serde(default)]
    pub notifiers: NotifiersConfig,
    #[serde(default)]
    pub analyzers: AnalyzerConfig,
    /// Per-jobname scheduling knobs the original kept as a free-form map;
    /// unused keys are preserved rather than rejected.
    #[serde(default)]
    pub jobs: HashMap<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            msg_backlog: default_msg_backlog(),
            bind_host: default_bind_host(),
            debug_level: default_debug_level(),
            alert_active: AlertActiveConfig::default(),
            caller: VoiceCallerConfig::default(),
            history: HistoryConfig::default(),
            alerts_profile: AlertsProfileConfig::default(),
            duty: DutyConfig::default(),
            notifiers: NotifiersConfig::default(),
            analyzers: AnalyzerConfig::default(),
            jobs: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_object_uses_every_default() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.bind_host, default_bind_host());
        assert_eq!(config.msg_backlog, default_msg_backlog());
        assert!(config.notifiers.default_sinks.is_empty());
    }

    #[test]
    fn unknown_top_level_keys_are_ignored_not_rejected() {
        let config: Config = serde_json::from_str(r#"{"some_future_field": 42}"#).unwrap();
        assert_eq!(config.debug_level, "info");
    }
}
