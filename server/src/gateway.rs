//! The outbound leg of the voice caller: an HTTP client against whatever
//! voice-gateway API is configured. Grounded on `CardWebhookSink`'s
//! `reqwest::Client` construction in `alertcenter-core`.

use std::time::Duration;

use alertcenter_core::caller::VoiceGateway;
use alertcenter_core::error::{AlertError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub struct HttpVoiceGateway {
    base_url: String,
    client: Client,
}

impl HttpVoiceGateway {
    pub fn new(base_url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_secs)).user_agent("alertcenter-caller/1.0").build()?;
        Ok(HttpVoiceGateway { base_url, client })
    }
}

#[async_trait]
impl VoiceGateway for HttpVoiceGateway {
    async fn call(&self, phone: &str, message: &str) -> Result<bool> {
        let response = self
            .client
            .post(format!("{}/call", self.base_url.trim_end_matches('/')))
            .json(&json!({ "phone": phone, "message": message }))
            .send()
            .await
            .map_err(|e| AlertError::SinkDelivery(e.to_string()))?;
        Ok(response.status().is_success())
    }
}
