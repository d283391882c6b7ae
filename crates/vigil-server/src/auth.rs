use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::{error_response, ErrorKind};
use crate::logging::TraceId;
use crate::state::AppState;

/// The org a request is authorized for. Every protected handler scopes its
/// reads and writes by it.
#[derive(Debug, Clone)]
pub struct OrgScope(pub String);

/// The non-empty credential of an `Authorization: Bearer <credential>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

/// Bearer-key middleware: resolves `Authorization: Bearer <key>` to its
/// [`OrgScope`].
pub async fn api_key_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let Some(key) = bearer_token(req.headers()) else {
        return error_response(
            &trace_id,
            ErrorKind::Unauthenticated,
            "missing or invalid authorization header",
        );
    };

    match state.api_keys.get(key) {
        Some(org_id) => {
            tracing::debug!(trace_id = %trace_id, org_id = %org_id, "Request authenticated");
            req.extensions_mut().insert(OrgScope(org_id.clone()));
            next.run(req).await
        }
        None => {
            tracing::warn!(trace_id = %trace_id, "Unknown API key");
            error_response(&trace_id, ErrorKind::Unauthenticated, "invalid api key")
        }
    }
}
