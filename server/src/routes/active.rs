//! Active-alert and history routes (§6).

use std::collections::HashMap;

use alertcenter_core::alert::Ack;
use alertcenter_core::error::AlertError;
use alertcenter_core::history::HistoryQuery;
use alertcenter_core::time_fmt::time_of;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list_active_array(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.active.list().await))
}

pub async fn list_active_wrapped(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "alerts": state.active.list().await }))
}

pub async fn history(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> ApiResult<Json<Value>> {
    let begin = params.get("begin").map(|s| time_of(s)).transpose()?;
    let end = params.get("end").map(|s| time_of(s)).transpose()?;
    let limit = params.get("limit").and_then(|s| s.parse::<i64>().ok()).unwrap_or(100);

    let query = HistoryQuery {
        alertname: params.get("alertname").cloned(),
        fingerprint: params.get("key").cloned(),
        begin,
        end,
        marker: params.get("marker").cloned(),
        limit,
    };
    let (items, marker) = state.history.list(&query).await?;
    Ok(Json(json!({ "items": items, "marker": marker })))
}

#[derive(Debug, Deserialize)]
pub struct AckBody {
    #[serde(default)]
    pub id: Vec<String>,
    #[serde(default)]
    pub alertname: Vec<String>,
    pub comment: String,
    pub username: String,
}

pub async fn ack(State(state): State<AppState>, Json(body): Json<AckBody>) -> ApiResult<Json<Value>> {
    let ack = Ack {
        username: body.username,
        comment: body.comment,
        time: Utc::now(),
    };
    let acked = state.active.ack(&body.alertname, &body.id, ack).await?;
    Ok(Json(json!({ "acked": acked })))
}

pub async fn delete_active(State(state): State<AppState>, Path(fingerprint): Path<String>) -> ApiResult<Json<Value>> {
    let removed = state.active.delete(&fingerprint).await;
    match removed {
        Some(alert) => Ok(Json(json!(alert))),
        None => Err(ApiError(AlertError::NotFound(fingerprint))),
    }
}
