//! Voice-caller control routes (§6): params, temp-close, silence window.

use alertcenter_core::error::AlertError;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn params(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.caller.config()))
}

#[derive(Debug, Deserialize)]
pub struct TempCloseBody {
    pub seconds: i64,
}

pub async fn temp_close(State(state): State<AppState>, Json(body): Json<TempCloseBody>) -> ApiResult<Json<Value>> {
    state.caller.temp_close(body.seconds).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn unset_temp_close(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.caller.unset_temp_close().await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct SilenceBody {
    #[serde(rename = "startAt")]
    pub start_at: String,
    #[serde(rename = "endAt")]
    pub end_at: String,
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h >= 24 || m >= 60 {
        return None;
    }
    Some(h * 3600 + m * 60)
}

pub async fn silence(State(state): State<AppState>, Json(body): Json<SilenceBody>) -> ApiResult<Json<Value>> {
    let start = parse_hhmm(&body.start_at).ok_or_else(|| ApiError(AlertError::Validation("bad startAt".to_string())))?;
    let end = parse_hhmm(&body.end_at).ok_or_else(|| ApiError(AlertError::Validation("bad endAt".to_string())))?;
    if start > end {
        return Err(ApiError(AlertError::Validation("startAt must not be after endAt".to_string())));
    }
    state.caller.silence(start, end).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn unset_silence(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.caller.unset_silence().await?;
    Ok(Json(json!({ "ok": true })))
}
