use crate::api::points::PointInput;
use crate::api::{error_response, storage_error_response, success_response, ErrorKind};
use crate::auth::OrgScope;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use vigil_common::proto;
use vigil_expr::Env;

/// Device bound as `device`. With `id` set the stored device of the
/// caller's org is used and the other fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceSample {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Rule bound as `rule`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSample {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_tag: String,
    #[serde(default)]
    pub expr: String,
}

#[derive(Debug, Deserialize)]
pub struct RuleTestRequest {
    pub expr: String,
    pub point: PointInput,
    #[serde(default)]
    pub device: DeviceSample,
    #[serde(default)]
    pub rule: RuleSample,
}

#[derive(Debug, Deserialize)]
pub struct AlarmTestRequest {
    pub subject_template: String,
    pub body_template: String,
    pub point: PointInput,
    #[serde(default)]
    pub device: DeviceSample,
    #[serde(default)]
    pub rule: RuleSample,
}

#[derive(Serialize)]
struct RuleTestResult {
    result: bool,
}

#[derive(Serialize)]
struct AlarmTestResult {
    subject: String,
    body: String,
}

/// Builds the evaluation bindings for a sample point, resolving the device
/// inside the caller's org when an id is given.
async fn sample_env(
    state: &AppState,
    org_id: &str,
    trace_id: &str,
    point: PointInput,
    device: DeviceSample,
    rule: RuleSample,
) -> Result<Env, Response> {
    let point = point
        .into_data_point(trace_id)
        .map_err(|msg| error_response(trace_id, ErrorKind::InvalidFormat, &msg))?;

    let device = match device.id {
        Some(id) => {
            let stored = state
                .store
                .read_device(org_id, &id)
                .await
                .map_err(|e| storage_error_response(trace_id, &e))?;
            proto::Device::from(&stored)
        }
        None => proto::Device {
            id: String::new(),
            org_id: org_id.to_string(),
            unique_id: point.unique_id.clone(),
            name: device.name,
            status: proto::Status::Active as i32,
            tags: device.tags,
        },
    };

    let rule = proto::Rule {
        id: rule.id,
        org_id: org_id.to_string(),
        name: rule.name,
        status: proto::Status::Active as i32,
        device_tag: rule.device_tag,
        attr: point.attr.clone(),
        expr: rule.expr,
    };

    Ok(Env::for_point(&point, &rule, &device, Utc::now()))
}

/// Evaluates an expression against a sample point; `{result}`.
pub async fn test_rule(
    Extension(trace_id): Extension<TraceId>,
    Extension(scope): Extension<OrgScope>,
    State(state): State<AppState>,
    body: Result<Json<RuleTestRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => return error_response(&trace_id, ErrorKind::InvalidFormat, &e.body_text()),
    };
    let mut rule = req.rule;
    rule.expr = req.expr.clone();

    let env = match sample_env(&state, &scope.0, &trace_id, req.point, req.device, rule).await {
        Ok(env) => env,
        Err(resp) => return resp,
    };
    match vigil_expr::eval_rule(&req.expr, &env) {
        Ok(result) => success_response(StatusCode::OK, &trace_id, RuleTestResult { result }),
        Err(e) => error_response(&trace_id, ErrorKind::InvalidFormat, &e.to_string()),
    }
}

/// Renders subject and body templates against a sample point.
pub async fn test_alarm(
    Extension(trace_id): Extension<TraceId>,
    Extension(scope): Extension<OrgScope>,
    State(state): State<AppState>,
    body: Result<Json<AlarmTestRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => return error_response(&trace_id, ErrorKind::InvalidFormat, &e.body_text()),
    };
    let env = match sample_env(&state, &scope.0, &trace_id, req.point, req.device, req.rule).await
    {
        Ok(env) => env,
        Err(resp) => return resp,
    };

    let rendered = vigil_expr::render(&req.subject_template, &env).and_then(|subject| {
        vigil_expr::render(&req.body_template, &env).map(|body| AlarmTestResult { subject, body })
    });
    match rendered {
        Ok(result) => success_response(StatusCode::OK, &trace_id, result),
        Err(e) => error_response(&trace_id, ErrorKind::InvalidFormat, &e.to_string()),
    }
}
