//! Post-alert analysis hooks (§4.10): run after an alert is ingested to
//! enrich it with a secondary lookup. Grounded on the original's single
//! `sg_forward` analyzer (an aggregation over a "what got forwarded where"
//! collection), generalized here behind a store trait instead of a
//! hand-written Mongo pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardTarget {
    pub url: String,
    pub stream_id: String,
    pub err: String,
    pub len: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerResult {
    pub alert_id: String,
    pub analyzer_type: String,
    pub alertname: String,
    pub results: Vec<ForwardTarget>,
}

/// What `run`/`get_results` need from storage. `server`/`store` provide the
/// concrete SQLite-backed implementation.
#[async_trait]
pub trait AnalyzerResultStore: Send + Sync {
    /// The `limit` most frequent `(url, stream_id, err)` combinations
    /// tagged `tag`, ordered by descending frequency.
    async fn top_forward_targets(&self, tag: &str, limit: i64) -> Result<Vec<ForwardTarget>>;
    async fn save_result(&self, result: &AnalyzerResult) -> Result<()>;
    async fn get_result(&self, alert_id: &str, analyzer_type: &str) -> Result<AnalyzerResult>;
}

/// Run after ingest for alerts that opt in, contributing extra context the
/// alert itself doesn't carry (§4.10).
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn kind(&self) -> &str;
    fn should_run(&self, alertname: &str) -> bool;
    async fn run(&self, alertname: &str, alert_id: &str) -> Result<()>;
    async fn get_results(&self, alert_id: &str) -> Result<AnalyzerResult>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingAnalyzerConfig {
    /// Maps an alertname to the tag its forwarding records are filed under.
    pub alertname_tag_map: HashMap<String, String>,
    pub limit: i64,
    #[serde(rename = "type")]
    pub analyzer_type: String,
}

pub struct ForwardingAnalyzer {
    config: ForwardingAnalyzerConfig,
    store: Arc<dyn AnalyzerResultStore>,
}

impl ForwardingAnalyzer {
    pub fn new(config: ForwardingAnalyzerConfig, store: Arc<dyn AnalyzerResultStore>) -> Self {
        ForwardingAnalyzer { config, store }
    }
}

#[async_trait]
impl Analyzer for ForwardingAnalyzer {
    fn kind(&self) -> &str {
        &self.config.analyzer_type
    }

    fn should_run(&self, alertname: &str) -> bool {
        self.config.alertname_tag_map.contains_key(alertname)
    }

    async fn run(&self, alertname: &str, alert_id: &str) -> Result<()> {
        let Some(tag) = self.config.alertname_tag_map.get(alertname) else {
            return Ok(());
        };
        let results = self.store.top_forward_targets(tag, self.config.limit).await?;
        let result = AnalyzerResult {
            alert_id: alert_id.to_string(),
            analyzer_type: self.config.analyzer_type.clone(),
            alertname: alertname.to_string(),
            results,
        };
        self.store.save_result(&result).await
    }

    async fn get_results(&self, alert_id: &str) -> Result<AnalyzerResult> {
        self.store.get_result(alert_id, &self.config.analyzer_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStore {
        saved: StdMutex<Vec<AnalyzerResult>>,
    }

    #[async_trait]
    impl AnalyzerResultStore for FakeStore {
        async fn top_forward_targets(&self, _tag: &str, limit: i64) -> Result<Vec<ForwardTarget>> {
            Ok((0..limit)
                .map(|i| ForwardTarget {
                    url: format!("https://edge-{i}.example.com"),
                    stream_id: format!("stream-{i}"),
                    err: String::new(),
                    len: 10 - i,
                })
                .collect())
        }

        async fn save_result(&self, result: &AnalyzerResult) -> Result<()> {
            self.saved.lock().unwrap_or_else(|e| e.into_inner()).push(result.clone());
            Ok(())
        }

        async fn get_result(&self, alert_id: &str, analyzer_type: &str) -> Result<AnalyzerResult> {
            self.saved
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .find(|r| r.alert_id == alert_id && r.analyzer_type == analyzer_type)
                .cloned()
                .ok_or_else(|| crate::error::AlertError::NotFound(alert_id.to_string()))
        }
    }

    fn analyzer() -> ForwardingAnalyzer {
        let mut tag_map = HashMap::new();
        tag_map.insert("sg_forward_failed".to_string(), "sg-forward".to_string());
        ForwardingAnalyzer::new(
            ForwardingAnalyzerConfig {
                alertname_tag_map: tag_map,
                limit: 3,
                analyzer_type: "sgForward".to_string(),
            },
            Arc::new(FakeStore::default()),
        )
    }

    #[test]
    fn should_run_only_for_mapped_alertnames() {
        let a = analyzer();
        assert!(a.should_run("sg_forward_failed"));
        assert!(!a.should_run("unrelated_alert"));
    }

    #[tokio::test]
    async fn run_persists_and_get_results_returns_it() {
        let a = analyzer();
        a.run("sg_forward_failed", "alert-1").await.unwrap();

        let result = a.get_results("alert-1").await.unwrap();
        assert_eq!(result.results.len(), 3);
        assert_eq!(result.alertname, "sg_forward_failed");
    }

    #[tokio::test]
    async fn run_is_a_noop_for_unmapped_alertnames() {
        let a = analyzer();
        a.run("unrelated_alert", "alert-2").await.unwrap();
        assert!(a.get_results("alert-2").await.is_err());
    }
}
