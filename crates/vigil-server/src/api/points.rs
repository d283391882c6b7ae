use crate::api::{error_response, success_response, ErrorKind};
use crate::auth::{bearer_token, OrgScope};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use prost::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vigil_common::proto::{data_point, DataPoint, StringMap, ValidatorIn};
use vigil_common::types::normalize_unique_id;

/// A point value as JSON: exactly one of
/// `{"int": 1}`, `{"float": 1.5}`, `{"str": "x"}`, `{"bool": true}`,
/// `{"bytes": "<base64>"}`, `{"map": {"k": "v"}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointValueInput {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Bytes(String),
    Map(HashMap<String, String>),
}

impl PointValueInput {
    fn into_wire(self) -> Result<data_point::Value, String> {
        Ok(match self {
            PointValueInput::Int(v) => data_point::Value::IntVal(v),
            PointValueInput::Float(v) => data_point::Value::Fl64Val(v),
            PointValueInput::Str(v) => data_point::Value::StrVal(v),
            PointValueInput::Bool(v) => data_point::Value::BoolVal(v),
            PointValueInput::Bytes(v) => data_point::Value::BytesVal(
                STANDARD
                    .decode(v.trim())
                    .map_err(|e| format!("bytes value is not base64: {e}"))?,
            ),
            PointValueInput::Map(entries) => data_point::Value::MapVal(StringMap { entries }),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointInput {
    pub unique_id: String,
    pub attr: String,
    pub value: PointValueInput,
    /// Unix milliseconds; the Validator fills in ingest time when absent.
    #[serde(default)]
    pub ts_ms: Option<i64>,
}

impl PointInput {
    pub fn into_data_point(self, trace_id: &str) -> Result<DataPoint, String> {
        let unique_id = normalize_unique_id(&self.unique_id);
        if unique_id.is_empty() {
            return Err("unique_id must not be empty".to_string());
        }
        if self.attr.trim().is_empty() {
            return Err("attr must not be empty".to_string());
        }
        Ok(DataPoint {
            unique_id,
            attr: self.attr,
            value: Some(self.value.into_wire()?),
            ts_ms: self.ts_ms,
            token: String::new(),
            trace_id: trace_id.to_string(),
        })
    }
}

#[derive(Serialize)]
struct PublishedPoint {
    unique_id: String,
    attr: String,
}

/// Publishes a point on behalf of the caller's org. The device token check
/// is skipped; the Validator still requires the device to belong to the org.
pub async fn publish_point(
    Extension(trace_id): Extension<TraceId>,
    Extension(scope): Extension<OrgScope>,
    State(state): State<AppState>,
    body: Result<Json<PointInput>, JsonRejection>,
) -> impl IntoResponse {
    let point = match decode_point(&trace_id, body) {
        Ok(point) => point,
        Err(resp) => return resp,
    };
    enqueue(&state, &trace_id, point, &scope.0).await
}

/// Device-originated ingest. The device presents its own token as
/// `Authorization: Bearer <token>` and claims no org; the Validator checks
/// the token against the stored device and drops the point on mismatch.
pub async fn ingest_device_point(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PointInput>, JsonRejection>,
) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return error_response(&trace_id, ErrorKind::Unauthenticated, "missing device token");
    };
    let mut point = match decode_point(&trace_id, body) {
        Ok(point) => point,
        Err(resp) => return resp,
    };
    point.token = token.to_string();
    enqueue(&state, &trace_id, point, "").await
}

fn decode_point(
    trace_id: &str,
    body: Result<Json<PointInput>, JsonRejection>,
) -> Result<DataPoint, Response> {
    let Json(input) =
        body.map_err(|e| error_response(trace_id, ErrorKind::InvalidFormat, &e.body_text()))?;
    input
        .into_data_point(trace_id)
        .map_err(|msg| error_response(trace_id, ErrorKind::InvalidFormat, &msg))
}

/// Queues `point` for the Validator. An empty `org_id` marks a
/// device-originated point whose token must be checked.
async fn enqueue(state: &AppState, trace_id: &str, point: DataPoint, org_id: &str) -> Response {
    let published = PublishedPoint {
        unique_id: point.unique_id.clone(),
        attr: point.attr.clone(),
    };
    let msg = ValidatorIn {
        point: Some(point),
        org_id: org_id.to_string(),
        skip_token: !org_id.is_empty(),
    };
    let topic = &state.config.pipeline.validator_topic;
    if let Err(e) = state.broker.publish(topic, msg.encode_to_vec()).await {
        tracing::error!(trace_id = %trace_id, org_id = %msg.org_id, error = %e, "Failed to publish point");
        return error_response(trace_id, ErrorKind::Unavailable, "broker unavailable");
    }

    tracing::info!(
        trace_id = %trace_id,
        org_id = %msg.org_id,
        from_device = !msg.skip_token,
        unique_id = %published.unique_id,
        attr = %published.attr,
        "Point published"
    );
    success_response(StatusCode::ACCEPTED, trace_id, published)
}
