//! The voice-call escalation sink (§4.7): throttled, silenceable,
//! temp-closeable, and backed by the on-call roster. Grounded on the
//! original's `Caller`/`caller_test.go` gating order and retry-then-recall
//! behavior.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio::time;

use crate::alert::{Alert, AlertForDefault, AlertStatus, Message, Severity};
use crate::duty::{self, DutyStore};
use crate::error::{AlertError, Result};
use crate::notifier::NotificationSink;
use crate::snapshot;

pub const CALLER_NAME: &str = "caller";

fn default_call_msg() -> String {
    "123456".to_string()
}

fn default_fail_try_times() -> u32 {
    2
}

fn default_call_interval_s() -> i64 {
    60 * 5
}

fn default_recall_times() -> u32 {
    2
}

fn default_recall_interval_s() -> i64 {
    60
}

fn default_state_file() -> String {
    "run/caller.data".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

const DAY_SECONDS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceCallerConfig {
    #[serde(default = "default_call_msg")]
    pub call_msg: String,
    #[serde(default = "default_fail_try_times")]
    pub fail_try_times: u32,
    /// Minimum gap between calls. `0` disables throttling entirely.
    #[serde(default = "default_call_interval_s")]
    pub call_interval_s: i64,
    #[serde(default = "default_recall_times")]
    pub recall_times: u32,
    #[serde(default = "default_recall_interval_s")]
    pub recall_interval_s: i64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Base URL of the outbound voice gateway HTTP API. Empty disables the
    /// caller sink entirely (no gateway to call).
    #[serde(default)]
    pub gateway_url: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
}

impl Default for VoiceCallerConfig {
    fn default() -> Self {
        VoiceCallerConfig {
            call_msg: default_call_msg(),
            fail_try_times: default_fail_try_times(),
            call_interval_s: default_call_interval_s(),
            recall_times: default_recall_times(),
            recall_interval_s: default_recall_interval_s(),
            state_file: default_state_file(),
            gateway_url: String::new(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

/// A valid call message is 4-8 ASCII alphanumeric characters (the original's
/// morse-message pattern).
pub fn is_valid_call_msg(s: &str) -> bool {
    (4..=8).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// The gateway only accepts a 4-8 digit alphanumeric token (§4.7). Use the
/// alert description when it parses as an integer `>= 100000` and the
/// stringified result still satisfies that shape; otherwise fall back to
/// the configured default token.
fn call_token(description: &str, default_msg: &str) -> String {
    description
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 100_000)
        .map(|n| n.to_string())
        .filter(|s| is_valid_call_msg(s))
        .unwrap_or_else(|| default_msg.to_string())
}

/// The outbound leg: whatever actually places the phone call. `server`
/// provides the concrete implementation (an HTTP call to a voice gateway).
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn call(&self, phone: &str, message: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CallerState {
    /// Silence window, seconds since midnight UTC; wraps past midnight if
    /// `end < start`.
    silence_start_sec: Option<u32>,
    silence_end_sec: Option<u32>,
    close_end_time: Option<DateTime<Utc>>,
    /// Last *successful* call time, keyed by alertname (§4.7 point 4):
    /// throttling is per-alertname, not global.
    #[serde(default)]
    last_call_times: std::collections::HashMap<String, DateTime<Utc>>,
}

pub struct VoiceCaller {
    config: VoiceCallerConfig,
    duty: Arc<dyn DutyStore>,
    gateway: Arc<dyn VoiceGateway>,
    escalation_sender: mpsc::Sender<Message>,
    state: RwLock<CallerState>,
    state_path: PathBuf,
}

impl VoiceCaller {
    pub async fn load(
        config: VoiceCallerConfig,
        duty: Arc<dyn DutyStore>,
        gateway: Arc<dyn VoiceGateway>,
        escalation_sender: mpsc::Sender<Message>,
        state_path: PathBuf,
    ) -> Result<Arc<Self>> {
        let state = snapshot::load::<CallerState>(&state_path).await?.unwrap_or_default();
        Ok(Arc::new(VoiceCaller {
            config,
            duty,
            gateway,
            escalation_sender,
            state: RwLock::new(state),
            state_path,
        }))
    }

    pub fn config(&self) -> &VoiceCallerConfig {
        &self.config
    }

    async fn persist(&self) -> Result<()> {
        let state = self.state.read().await.clone();
        snapshot::save(&state, &self.state_path).await
    }

    /// Silence calls daily between `start_sec` and `end_sec` (seconds since
    /// midnight UTC).
    pub async fn silence(&self, start_sec: u32, end_sec: u32) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.silence_start_sec = Some(start_sec % DAY_SECONDS as u32);
            state.silence_end_sec = Some(end_sec % DAY_SECONDS as u32);
        }
        self.persist().await
    }

    pub async fn unset_silence(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.silence_start_sec = None;
            state.silence_end_sec = None;
        }
        self.persist().await
    }

    /// Suppress every call for the next `seconds`.
    pub async fn temp_close(&self, seconds: i64) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.close_end_time = Some(Utc::now() + chrono::Duration::seconds(seconds));
        }
        self.persist().await
    }

    pub async fn unset_temp_close(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.close_end_time = None;
        }
        self.persist().await
    }

    async fn is_temp_closed(&self, now: DateTime<Utc>) -> bool {
        self.state.read().await.close_end_time.is_some_and(|end| now < end)
    }

    async fn is_silenced(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.read().await;
        let (Some(start), Some(end)) = (state.silence_start_sec, state.silence_end_sec) else {
            return false;
        };
        let sec_of_day = now.num_seconds_from_midnight();
        if start <= end {
            (start..end).contains(&sec_of_day)
        } else {
            // Window wraps past midnight, e.g. 22:00-06:00.
            sec_of_day >= start || sec_of_day < end
        }
    }

    async fn is_throttled(&self, alertname: &str, now: DateTime<Utc>) -> bool {
        if self.config.call_interval_s <= 0 {
            return false;
        }
        self.state
            .read()
            .await
            .last_call_times
            .get(alertname)
            .is_some_and(|last| (now - *last).num_seconds() < self.config.call_interval_s)
    }

    /// Record `now` as the last successful call time for `alertname`. Only
    /// called after a call to that alertname's on-call staff actually
    /// succeeds.
    async fn mark_called(&self, alertname: &str, now: DateTime<Utc>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.last_call_times.insert(alertname.to_string(), now);
        }
        self.persist().await
    }

    /// Re-inject a synthetic critical alert when on-call resolution itself
    /// fails, so the failure is visible through the normal pipeline instead
    /// of being swallowed.
    async fn emit_resolution_failure(&self, reason: &str) {
        let alert = Alert::from_default(AlertForDefault {
            alertname: "caller_oncall_resolution_failed".to_string(),
            desc: reason.to_string(),
            status: AlertStatus::Firing,
            severity: Severity::Critical,
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: String::new(),
            labels: std::collections::HashMap::new(),
            need_handle: false,
        });
        let message = Message::single(uuid::Uuid::new_v4().to_string(), alert);
        if self.escalation_sender.send(message).await.is_err() {
            tracing::warn!("could not re-inject caller resolution-failure alert: channel closed");
        }
    }

    /// Attempt the call up to `fail_try_times`, then unconditionally
    /// schedule up to `recall_times` recalls regardless of whether the
    /// initial attempt succeeded. Preserved from the original as-is (§9).
    fn schedule_recalls(self: &Arc<Self>, phone: String, message: String) {
        if self.config.recall_times == 0 || self.config.recall_interval_s <= 0 {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let interval = time::Duration::from_secs(this.config.recall_interval_s.max(0) as u64);
            for _ in 0..this.config.recall_times {
                time::sleep(interval).await;
                if let Err(err) = this.gateway.call(&phone, &message).await {
                    tracing::warn!(error = %err, phone = %phone, "recall attempt failed");
                }
            }
        });
    }

    async fn call_with_retries(&self, phone: &str, message: &str) -> bool {
        for attempt in 0..self.config.fail_try_times.max(1) {
            match self.gateway.call(phone, message).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(error = %err, phone = %phone, attempt, "voice call attempt failed");
                }
            }
        }
        false
    }
}

#[async_trait]
impl NotificationSink for VoiceCaller {
    fn name(&self) -> &str {
        CALLER_NAME
    }

    async fn notify(&self, message: &Message) -> Result<()> {
        if message.alerts.iter().all(|a| a.status == AlertStatus::Resolved) {
            return Ok(());
        }

        // The throttle key and the call token both key off the lead alert
        // in the batch, matching the original (a caller message always
        // carried exactly one alert).
        let lead = &message.alerts[0];
        let alertname = lead.alertname.as_str();
        let token = call_token(&lead.description, &self.config.call_msg);

        let now = Utc::now();
        if self.is_temp_closed(now).await {
            return Ok(());
        }
        if self.is_silenced(now).await {
            return Ok(());
        }
        if self.is_throttled(alertname, now).await {
            return Ok(());
        }

        let staffs = duty::get_current(self.duty.as_ref(), now).await?;
        if staffs.is_empty() {
            self.emit_resolution_failure("no on-call staff resolved for current rotation").await;
            return Err(AlertError::CallerFailureEscalation("empty on-call roster".to_string()));
        }

        let mut any_succeeded = false;
        for staff in &staffs {
            let succeeded = self.call_with_retries(&staff.phone, &token).await;
            any_succeeded |= succeeded;
            if !succeeded {
                tracing::warn!(phone = %staff.phone, "voice call failed after retries, recall still scheduled");
            }
        }

        if any_succeeded {
            self.mark_called(alertname, now).await?;
        }
        Ok(())
    }
}
