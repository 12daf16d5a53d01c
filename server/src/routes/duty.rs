//! On-call duty routes (§6): current resolution plus staff/roster CRUD.

use alertcenter_core::duty::{get_current, Roster, Staff};
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn current(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let staffs = get_current(state.duty.as_ref(), chrono::Utc::now()).await?;
    Ok(Json(json!({ "staffs": staffs })))
}

pub async fn list_staffs(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!(state.duty.list_staffs().await?)))
}

pub async fn create_staff(State(state): State<AppState>, Json(staff): Json<Staff>) -> ApiResult<Json<Value>> {
    state.duty.create_staff(staff).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn get_staff(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    Ok(Json(json!(state.duty.get_staff(&id).await?)))
}

pub async fn update_staff(State(state): State<AppState>, Path(id): Path<String>, Json(mut staff): Json<Staff>) -> ApiResult<Json<Value>> {
    staff.id = id;
    state.duty.update_staff(&staff).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn remove_staff(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.duty.remove_staff(&id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn list_rosters(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!(state.duty.list_rosters().await?)))
}

pub async fn create_roster(State(state): State<AppState>, Json(roster): Json<Roster>) -> ApiResult<Json<Value>> {
    state.duty.create_roster(roster).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn get_roster(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    Ok(Json(json!(state.duty.get_roster(&id).await?)))
}

pub async fn update_roster(State(state): State<AppState>, Path(id): Path<String>, Json(mut roster): Json<Roster>) -> ApiResult<Json<Value>> {
    roster.id = id;
    state.duty.update_roster(&roster).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn remove_roster(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.duty.remove_roster(&id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// Update a batch of rosters in one call, grounded on the original's
/// `BatchUpdateRosters` admin operation for reordering priorities.
pub async fn batch_update_rosters(State(state): State<AppState>, Json(rosters): Json<Vec<Roster>>) -> ApiResult<Json<Value>> {
    for roster in &rosters {
        state.duty.update_roster(roster).await?;
    }
    Ok(Json(json!({ "updated": rosters.len() })))
}
