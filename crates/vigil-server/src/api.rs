pub mod history;
pub mod pagination;
pub mod points;
pub mod testing;

use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use vigil_storage::StorageError;

/// Envelope wrapping every admin API response.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 0 on success.
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

/// Every failure the API reports. Each kind has one fixed HTTP status and
/// one fixed `err_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidFormat,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidFormat => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidFormat => 1001,
            ErrorKind::Unauthenticated => 1002,
            ErrorKind::PermissionDenied => 1003,
            ErrorKind::NotFound => 1004,
            ErrorKind::AlreadyExists => 1005,
            ErrorKind::Unavailable => 1503,
            ErrorKind::Internal => 1500,
        }
    }
}

impl From<&StorageError> for ErrorKind {
    fn from(err: &StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            e if e.is_infrastructure() => ErrorKind::Unavailable,
            _ => ErrorKind::Internal,
        }
    }
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn error_response(trace_id: &str, kind: ErrorKind, msg: &str) -> Response {
    (
        kind.status(),
        Json(ApiResponse::<Value> {
            err_code: kind.code(),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

/// Maps a storage failure, hiding infrastructure details from the caller.
pub fn storage_error_response(trace_id: &str, err: &StorageError) -> Response {
    let kind = ErrorKind::from(err);
    match kind {
        ErrorKind::NotFound | ErrorKind::AlreadyExists => {
            error_response(trace_id, kind, &err.to_string())
        }
        _ => {
            tracing::error!(trace_id = %trace_id, error = %err, "Storage request failed");
            error_response(trace_id, kind, "storage unavailable")
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
}

/// Version and uptime. No authentication.
async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
        },
    )
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/device/points", post(points::ingest_device_point))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/points", post(points::publish_point))
        .route("/v1/rules/test", post(testing::test_rule))
        .route("/v1/alarms/test", post(testing::test_alarm))
        .route("/v1/events", get(history::list_events))
        .route("/v1/alerts", get(history::list_alerts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_have_stable_codes() {
        let table = [
            (ErrorKind::InvalidFormat, 400, 1001),
            (ErrorKind::Unauthenticated, 401, 1002),
            (ErrorKind::PermissionDenied, 403, 1003),
            (ErrorKind::NotFound, 404, 1004),
            (ErrorKind::AlreadyExists, 409, 1005),
            (ErrorKind::Unavailable, 503, 1503),
            (ErrorKind::Internal, 500, 1500),
        ];
        for (kind, status, code) in table {
            assert_eq!(kind.status().as_u16(), status);
            assert_eq!(kind.code(), code);
        }
    }

    #[test]
    fn storage_errors_map_to_kinds() {
        let not_found = StorageError::NotFound {
            entity: "device",
            id: "d1".into(),
        };
        assert_eq!(ErrorKind::from(&not_found), ErrorKind::NotFound);

        let io = StorageError::Io(std::io::Error::other("disk gone"));
        assert_eq!(ErrorKind::from(&io), ErrorKind::Unavailable);

        let column = StorageError::InvalidColumn {
            column: "devices.status",
            value: "weird".into(),
        };
        assert_eq!(ErrorKind::from(&column), ErrorKind::Internal);
    }
}
