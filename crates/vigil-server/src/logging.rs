use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use vigil_common::trace::generate_trace_id;

/// Request trace id, stored in request extensions by [`request_logging`].
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// Installs the global `tracing` subscriber. `RUST_LOG` adds to the
/// default `vigil=info` directive.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

const MAX_BODY_LOG_CHARS: usize = 200;

/// Request bodies on these paths may carry device tokens.
const SENSITIVE_PREFIXES: &[&str] = &["/v1/points", "/v1/device/points"];

/// Truncates to at most `max` bytes on a char boundary.
fn truncate_body(bytes: &[u8], max: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() > max => {
            let mut end = max;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &s[..end])
        }
        Ok(s) => s.to_string(),
        Err(_) => "<non-utf8 body>".to_string(),
    }
}

fn format_elapsed(elapsed_us: u128) -> String {
    if elapsed_us < 1000 {
        format!("{elapsed_us}µs")
    } else if elapsed_us < 1_000_000 {
        format!("{}ms", elapsed_us / 1000)
    } else {
        format!("{:.1}s", elapsed_us as f64 / 1_000_000.0)
    }
}

/// Request/response logging middleware. Tags every request with a fresh
/// [`TraceId`] and echoes it as `X-Trace-Id`.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let uri = req.uri().clone();
    let path = uri.path().to_string();
    let url = match uri.query() {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.clone(),
    };
    let is_sensitive = SENSITIVE_PREFIXES.iter().any(|p| path.starts_with(p));

    let has_body = !is_sensitive && matches!(method.as_str(), "POST" | "PUT" | "PATCH");
    let (req, req_body_snippet) = if has_body {
        let (parts, body) = req.into_parts();
        let body_bytes = axum::body::to_bytes(body, 1024 * 1024)
            .await
            .unwrap_or_default();
        let snippet = truncate_body(&body_bytes, MAX_BODY_LOG_CHARS);
        (Request::from_parts(parts, Body::from(body_bytes)), snippet)
    } else {
        (req, String::new())
    };

    if req_body_snippet.is_empty() {
        tracing::info!(trace_id = %trace_id, method = %method, path = %url, "--> request");
    } else {
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %url,
            body = %req_body_snippet,
            "--> request"
        );
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status();

    let (parts, body) = response.into_parts();
    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let body_snippet = if is_json && !body_bytes.is_empty() {
        truncate_body(&body_bytes, MAX_BODY_LOG_CHARS)
    } else {
        String::new()
    };

    let status_code = status.as_u16();
    if status.is_server_error() {
        tracing::error!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, body = %body_snippet, "<-- response");
    } else if status.is_client_error() {
        tracing::warn!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, body = %body_snippet, "<-- response");
    } else {
        tracing::info!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, "<-- response");
    }

    let mut response = Response::from_parts(parts, Body::from(body_bytes));
    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("X-Trace-Id", val);
    }
    response
}
