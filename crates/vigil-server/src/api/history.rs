use crate::api::pagination::{
    decode_cursor, deserialize_optional_u64, encode_cursor, page_limit, resolve_window, Window,
};
use crate::api::{error_response, storage_error_response, success_response, ErrorKind};
use crate::auth::OrgScope;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_common::types::{normalize_unique_id, Alert, Event};
use vigil_storage::{AlertFilter, Cursor, EventFilter, Page};

/// Query parameters shared by both history listings.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub unique_id: Option<String>,
    /// Resolved to the device's `unique_id` within the caller's org.
    pub device_id: Option<String>,
    pub rule_id: Option<String>,
    pub alarm_id: Option<String>,
    pub user_id: Option<String>,
    /// Exclusive lower bound (RFC 3339).
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339).
    pub end: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub limit: Option<u64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct PageResponse<T: Serialize> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T: Serialize> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            items: page.items,
            next_cursor: page.next.as_ref().map(encode_cursor),
        }
    }
}

/// Parameters after validation and device resolution.
struct Resolved {
    unique_id: Option<String>,
    window: Window,
    limit: u64,
    cursor: Option<Cursor>,
}

async fn resolve(
    state: &AppState,
    org_id: &str,
    trace_id: &str,
    params: &HistoryParams,
) -> Result<Resolved, Response> {
    let invalid = |msg: &str| error_response(trace_id, ErrorKind::InvalidFormat, msg);

    let window = resolve_window(
        params.start,
        params.end,
        Utc::now(),
        state.config.api.max_list_span_days,
    )
    .map_err(|msg| invalid(&msg))?;

    let cursor = match params.cursor.as_deref().filter(|c| !c.is_empty()) {
        Some(raw) => Some(decode_cursor(raw).map_err(|msg| invalid(&msg))?),
        None => None,
    };

    let mut unique_id = params
        .unique_id
        .as_deref()
        .map(normalize_unique_id)
        .filter(|u| !u.is_empty());
    if let Some(device_id) = params.device_id.as_deref().filter(|d| !d.is_empty()) {
        let device = state
            .store
            .read_device(org_id, device_id)
            .await
            .map_err(|e| storage_error_response(trace_id, &e))?;
        match &unique_id {
            Some(u) if *u != device.unique_id => {
                return Err(invalid("unique_id does not match device_id"));
            }
            _ => unique_id = Some(device.unique_id),
        }
    }

    Ok(Resolved {
        unique_id,
        window,
        limit: page_limit(params.limit),
        cursor,
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

/// Events of the caller's org, newest first.
pub async fn list_events(
    Extension(trace_id): Extension<TraceId>,
    Extension(scope): Extension<OrgScope>,
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = match params {
        Ok(params) => params,
        Err(e) => return error_response(&trace_id, ErrorKind::InvalidFormat, &e.body_text()),
    };
    let resolved = match resolve(&state, &scope.0, &trace_id, &params).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let filter = EventFilter {
        org_id: scope.0.clone(),
        unique_id: resolved.unique_id,
        rule_id: non_empty(&params.rule_id),
        start_ms: resolved.window.start_ms,
        end_ms: resolved.window.end_ms,
        limit: resolved.limit,
        cursor: resolved.cursor,
    };
    match state.store.list_events(&filter).await {
        Ok(page) => success_response(StatusCode::OK, &trace_id, PageResponse::<Event>::from(page)),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// Alerts of the caller's org, newest first.
pub async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    Extension(scope): Extension<OrgScope>,
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = match params {
        Ok(params) => params,
        Err(e) => return error_response(&trace_id, ErrorKind::InvalidFormat, &e.body_text()),
    };
    let resolved = match resolve(&state, &scope.0, &trace_id, &params).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let filter = AlertFilter {
        org_id: scope.0.clone(),
        unique_id: resolved.unique_id,
        alarm_id: non_empty(&params.alarm_id),
        user_id: non_empty(&params.user_id),
        start_ms: resolved.window.start_ms,
        end_ms: resolved.window.end_ms,
        limit: resolved.limit,
        cursor: resolved.cursor,
    };
    match state.store.list_alerts(&filter).await {
        Ok(page) => success_response(StatusCode::OK, &trace_id, PageResponse::<Alert>::from(page)),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}
