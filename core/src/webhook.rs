//! Webhook notification sinks (§4.8): a rich-card flavor (Slack/LeanChat
//! style attachments) and a plain-text flavor (QQ-robot style newline-joined
//! messages). Both cap how many alerts they display and summarize the
//! overflow; both flag emergent alerts distinctly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

use crate::alert::{Message, Severity};
use crate::error::{AlertError, Result};
use crate::notifier::NotificationSink;

fn default_time_layout() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn default_username() -> String {
    "Cronus".to_string()
}

fn default_more_alerts_text() -> String {
    "more alerts, see the dashboard for the full list".to_string()
}

fn default_max_display_cnt() -> usize {
    3
}

fn default_alert_id_header() -> String {
    "Alert-Id".to_string()
}

fn default_time_header() -> String {
    "Time".to_string()
}

fn default_max_lines() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    10
}

fn color_for(severity: &Severity) -> &'static str {
    match severity {
        Severity::Warning => "warning",
        Severity::Critical => "danger",
        Severity::Success => "good",
        _ => "warning",
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct CardWebhookConfig {
    pub name: String,
    pub webhook_url: String,
    #[serde(default = "default_time_layout")]
    pub time_layout: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_more_alerts_text")]
    pub more_alerts_text: String,
    #[serde(default = "default_max_display_cnt")]
    pub max_display_cnt: usize,
    #[serde(default = "default_alert_id_header")]
    pub alert_id_header: String,
    #[serde(default = "default_time_header")]
    pub time_header: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct CardAttachment {
    fallback: String,
    text: String,
    title: String,
    footer: String,
    color: &'static str,
    ts: i64,
    mrkdwn_in: Vec<&'static str>,
}

/// Rich-card webhook sink, grounded on the original's Slack/LeanChat
/// notifiers: one attachment per alert (capped at `max_display_cnt`), an
/// overflow summary attachment, and an emergency banner when any alert in
/// the message is emergent.
pub struct CardWebhookSink {
    config: CardWebhookConfig,
    client: Client,
}

impl CardWebhookSink {
    pub fn new(config: CardWebhookConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("alertcenter-webhook/1.0")
            .build()?;
        Ok(CardWebhookSink { config, client })
    }

    fn build_payload(&self, message: &Message) -> serde_json::Value {
        let shown = message.alerts.iter().take(self.config.max_display_cnt);
        let mut attachments: Vec<CardAttachment> = shown
            .map(|alert| CardAttachment {
                fallback: format!("{}: {}", alert.alertname, alert.description),
                text: alert.description.clone(),
                title: if alert.status == crate::alert::AlertStatus::Resolved {
                    format!("[RESOLVED] {}", alert.alertname)
                } else {
                    alert.alertname.clone()
                },
                footer: format!(
                    "{}: {} | {}: {}",
                    self.config.alert_id_header,
                    alert.id,
                    self.config.time_header,
                    alert.starts_at.format(&self.config.time_layout),
                ),
                color: color_for(&alert.display_severity),
                ts: alert.starts_at.timestamp(),
                mrkdwn_in: vec!["text"],
            })
            .collect();

        if message.alerts.len() > self.config.max_display_cnt {
            let more = message.alerts.len() - self.config.max_display_cnt;
            attachments.push(CardAttachment {
                fallback: format!("{more} {}", self.config.more_alerts_text),
                text: format!("{more} {}", self.config.more_alerts_text),
                title: "More alerts".to_string(),
                footer: String::new(),
                color: "warning",
                ts: chrono::Utc::now().timestamp(),
                mrkdwn_in: vec!["text"],
            });
        }

        if message.alerts.iter().any(|a| a.is_emergent) {
            attachments.push(CardAttachment {
                fallback: "one or more alerts have escalated to emergency".to_string(),
                text: "one or more alerts have escalated to emergency".to_string(),
                title: "EMERGENCY".to_string(),
                footer: String::new(),
                color: "danger",
                ts: chrono::Utc::now().timestamp(),
                mrkdwn_in: vec!["text"],
            });
        }

        json!({
            "username": self.config.username,
            "text": format!("{} alert(s)", message.alerts.len()),
            "attachments": attachments,
        })
    }
}

#[async_trait]
impl NotificationSink for CardWebhookSink {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn notify(&self, message: &Message) -> Result<()> {
        if message.alerts.is_empty() {
            return Ok(());
        }
        let payload = self.build_payload(message);
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AlertError::SinkDelivery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AlertError::SinkDelivery(format!(
                "webhook {} returned {}",
                self.config.name,
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct PlainTextWebhookConfig {
    pub name: String,
    pub webhook_url: String,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Plain-text webhook sink (QQ-robot style): newline-joined alert lines
/// capped at `max_lines`, with a one-line summary of the overflow.
pub struct PlainTextWebhookSink {
    config: PlainTextWebhookConfig,
    client: Client,
}

impl PlainTextWebhookSink {
    pub fn new(config: PlainTextWebhookConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("alertcenter-webhook/1.0")
            .build()?;
        Ok(PlainTextWebhookSink { config, client })
    }

    fn build_text(&self, message: &Message) -> String {
        let mut lines: Vec<String> = message
            .alerts
            .iter()
            .take(self.config.max_lines)
            .map(|alert| {
                let emergent = if alert.is_emergent { " [EMERGENT]" } else { "" };
                format!("[{}] {}: {}{}", alert.display_severity.as_label(), alert.alertname, alert.description, emergent)
            })
            .collect();

        if message.alerts.len() > self.config.max_lines {
            lines.push(format!("...and {} more", message.alerts.len() - self.config.max_lines));
        }

        lines.join("\n")
    }
}

#[async_trait]
impl NotificationSink for PlainTextWebhookSink {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn notify(&self, message: &Message) -> Result<()> {
        if message.alerts.is_empty() {
            return Ok(());
        }
        let body = json!({ "text": self.build_text(message) });
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AlertError::SinkDelivery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AlertError::SinkDelivery(format!(
                "webhook {} returned {}",
                self.config.name,
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertForDefault, AlertStatus, Severity as Sev};
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert(name: &str, emergent: bool) -> crate::alert::Alert {
        let mut a = crate::alert::Alert::from_default(AlertForDefault {
            alertname: name.to_string(),
            desc: "something is wrong".to_string(),
            status: AlertStatus::Firing,
            severity: Sev::Critical,
            starts_at: chrono::Utc::now(),
            ends_at: None,
            generator_url: String::new(),
            labels: HashMap::new(),
            need_handle: true,
        });
        a.is_emergent = emergent;
        a
    }

    #[tokio::test]
    async fn card_sink_posts_and_caps_display_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = CardWebhookSink::new(CardWebhookConfig {
            name: "card".to_string(),
            webhook_url: format!("{}/hook", server.uri()),
            time_layout: default_time_layout(),
            username: default_username(),
            more_alerts_text: default_more_alerts_text(),
            max_display_cnt: 2,
            alert_id_header: default_alert_id_header(),
            time_header: default_time_header(),
            timeout_secs: 5,
        })
        .unwrap();

        let alerts = vec![alert("a", false), alert("b", false), alert("c", true)];
        let message = Message::new("c1".to_string(), alerts);
        let payload = sink.build_payload(&message);
        let attachments = payload["attachments"].as_array().unwrap();
        // 2 shown + 1 overflow summary + 1 emergency banner = 4
        assert_eq!(attachments.len(), 4);

        sink.notify(&message).await.unwrap();
    }

    #[tokio::test]
    async fn plain_text_sink_truncates_and_summarizes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = PlainTextWebhookSink::new(PlainTextWebhookConfig {
            name: "qq".to_string(),
            webhook_url: format!("{}/hook", server.uri()),
            max_lines: 1,
            timeout_secs: 5,
        })
        .unwrap();

        let message = Message::new("c1".to_string(), vec![alert("a", false), alert("b", false)]);
        let text = sink.build_text(&message);
        assert!(text.contains("...and 1 more"));

        sink.notify(&message).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_a_sink_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = CardWebhookSink::new(CardWebhookConfig {
            name: "card".to_string(),
            webhook_url: format!("{}/hook", server.uri()),
            time_layout: default_time_layout(),
            username: default_username(),
            more_alerts_text: default_more_alerts_text(),
            max_display_cnt: 3,
            alert_id_header: default_alert_id_header(),
            time_header: default_time_header(),
            timeout_secs: 5,
        })
        .unwrap();

        let message = Message::single("c1".to_string(), alert("a", false));
        let err = sink.notify(&message).await.unwrap_err();
        assert!(matches!(err, AlertError::SinkDelivery(_)));
    }
}
