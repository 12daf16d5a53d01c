//! `POST /alerts` and `POST /prometheus/alerts` (§6): normalize into
//! `Vec<Alert>` and hand off to `alertcenter_core::dispatcher::dispatch`.

use alertcenter_core::alert::{Alert, AlertForDefault, AlertForProm};
use alertcenter_core::dispatcher::dispatch;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DefaultIngestBody {
    pub alerts: Vec<AlertForDefault>,
    #[serde(default)]
    pub from: Option<String>,
}

pub async fn ingest_default(State(state): State<AppState>, Json(body): Json<DefaultIngestBody>) -> ApiResult<Json<Value>> {
    let correlation_id = body.from.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let alerts: Vec<Alert> = body.alerts.into_iter().map(Alert::from_default).collect();
    dispatch(&state.active, &state.analyzers, correlation_id.clone(), alerts, &state.ingest_sender).await?;
    Ok(Json(json!({ "correlationId": correlation_id })))
}

/// The Prometheus Alertmanager webhook shape carries a handful of
/// group-level fields alongside `alerts`; nothing else in this service
/// needs them, so they're accepted (unknown fields are never rejected) but
/// not retained.
#[derive(Debug, Deserialize)]
pub struct PrometheusIngestBody {
    pub alerts: Vec<AlertForProm>,
}

pub async fn ingest_prometheus(State(state): State<AppState>, Json(body): Json<PrometheusIngestBody>) -> ApiResult<Json<Value>> {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let alerts: Vec<Alert> = body.alerts.into_iter().map(Alert::from_prom).collect();
    dispatch(&state.active, &state.analyzers, correlation_id.clone(), alerts, &state.ingest_sender).await?;
    Ok(Json(json!({ "correlationId": correlation_id })))
}
