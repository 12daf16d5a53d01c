//! Alert-profile CRUD routes (§6).

use alertcenter_core::profile::{AlertProfile, AlertProfileUpdate};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProfileBody {
    pub alertname: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub need_oncall: bool,
    #[serde(default)]
    pub notifiers: Vec<String>,
}

pub async fn create(State(state): State<AppState>, Json(body): Json<CreateProfileBody>) -> ApiResult<Json<Value>> {
    let now = Utc::now();
    state
        .profiles
        .create(AlertProfile {
            alertname: body.alertname,
            description: body.description,
            tags: body.tags,
            need_oncall: body.need_oncall,
            notifiers: body.notifiers,
            is_new: true,
            create_at: now,
            latest_time: now,
            update_at: now,
        })
        .await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn list(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.profiles.list_by_cache().await))
}

pub async fn get(State(state): State<AppState>, Path(alertname): Path<String>) -> ApiResult<Json<Value>> {
    Ok(Json(json!(state.profiles.get(&alertname).await?)))
}

pub async fn delete(State(state): State<AppState>, Path(alertname): Path<String>) -> ApiResult<Json<Value>> {
    state.profiles.delete(&alertname).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileBody {
    pub alertname: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub need_oncall: Option<bool>,
    #[serde(default)]
    pub notifiers: Option<Vec<String>>,
}

pub async fn update(State(state): State<AppState>, Json(body): Json<UpdateProfileBody>) -> ApiResult<Json<Value>> {
    let update = AlertProfileUpdate {
        description: body.description,
        need_oncall: body.need_oncall,
        notifiers: body.notifiers,
    };
    state.profiles.update(&body.alertname, &update).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagOp {
    Append,
    Delete,
}

#[derive(Debug, Deserialize)]
pub struct TagsBody {
    pub alertname: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub op: TagOp,
}

pub async fn tags(State(state): State<AppState>, Json(body): Json<TagsBody>) -> ApiResult<Json<Value>> {
    match body.op {
        TagOp::Append => state.profiles.append_tags(&body.alertname, &body.tags).await?,
        TagOp::Delete => state.profiles.delete_tags(&body.alertname, &body.tags).await?,
    }
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub old: String,
    pub new: String,
}

pub async fn rename(State(state): State<AppState>, Json(body): Json<RenameBody>) -> ApiResult<Json<Value>> {
    state.profiles.rename(&body.old, &body.new).await?;
    Ok(Json(json!({ "ok": true })))
}
