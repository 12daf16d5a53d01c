//! The admin HTTP API (§6): one module per resource family, composed into a
//! single router over `AppState`.

mod active;
mod analyzer;
mod caller;
mod duty;
mod ingest;
mod profiles;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/alerts", post(ingest::ingest_default))
        .route("/prometheus/alerts", post(ingest::ingest_prometheus))
        .route("/active/alerts", get(active::list_active_array))
        .route("/alerts/active", get(active::list_active_wrapped))
        .route("/alerts/history", get(active::history))
        .route("/alerts/ack", post(active::ack))
        .route("/alerts/{fingerprint}", delete(active::delete_active))
        .route("/alerts/profiles", post(profiles::create).get(profiles::list))
        .route("/alerts/profile/{alertname}", get(profiles::get).delete(profiles::delete))
        .route("/alerts/profiles/update", post(profiles::update))
        .route("/alerts/profiles/tags", post(profiles::tags))
        .route("/alerts/profiles/rename", post(profiles::rename))
        .route("/caller/params", get(caller::params))
        .route("/caller/tempclose", post(caller::temp_close).delete(caller::unset_temp_close))
        .route("/caller/silence", post(caller::silence).delete(caller::unset_silence))
        .route("/duty/current", get(duty::current))
        .route("/duty/staffs", get(duty::list_staffs).post(duty::create_staff))
        .route("/duty/staffs/{id}", get(duty::get_staff).put(duty::update_staff).delete(duty::remove_staff))
        .route("/duty/rosters", get(duty::list_rosters).post(duty::create_roster))
        .route("/duty/rosters/{id}", get(duty::get_roster).put(duty::update_roster).delete(duty::remove_roster))
        .route("/batch/duty/rosters/update", post(duty::batch_update_rosters))
        .route("/analyzer/result", get(analyzer::result))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
