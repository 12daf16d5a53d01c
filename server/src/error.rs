//! Maps `AlertError` onto HTTP responses per the error-kind table: `NotFound`
//! -> 404, `Duplicate` -> 409, `Validation`/`BadObjectId` -> 400, everything
//! else -> 500. Sink/history/snapshot failures never reach an HTTP handler —
//! they're logged and swallowed at the layer that produces them.

use alertcenter_core::error::AlertError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError(pub AlertError);

impl From<AlertError> for ApiError {
    fn from(err: AlertError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AlertError::NotFound(_) => StatusCode::NOT_FOUND,
            AlertError::Duplicate(_) => StatusCode::CONFLICT,
            AlertError::Validation(_) | AlertError::BadObjectId(_) => StatusCode::BAD_REQUEST,
            AlertError::InternalDb(_)
            | AlertError::SinkDelivery(_)
            | AlertError::HistoryWrite(_)
            | AlertError::Snapshot(_)
            | AlertError::CallerFailureEscalation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
