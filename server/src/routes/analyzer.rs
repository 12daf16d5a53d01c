//! `GET /analyzer/result?alertId=&type=` (§6).

use std::collections::HashMap;

use alertcenter_core::error::AlertError;
use axum::extract::{Query, State};
use axum::Json;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn result(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> ApiResult<Json<Value>> {
    let alert_id = params.get("alertId").ok_or_else(|| ApiError(AlertError::Validation("alertId is required".to_string())))?;
    let kind = params.get("type").ok_or_else(|| ApiError(AlertError::Validation("type is required".to_string())))?;

    let analyzer = state
        .analyzers
        .iter()
        .find(|a| a.kind() == kind.as_str())
        .ok_or_else(|| ApiError(AlertError::NotFound(format!("analyzer {kind}"))))?;

    Ok(Json(json!(analyzer.get_results(alert_id).await?)))
}
