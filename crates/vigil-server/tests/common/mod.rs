#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use vigil_common::types::{Alert, AlertStatus, Device, Event, Org, Status};
use vigil_queue::MemoryBroker;
use vigil_server::app;
use vigil_server::config::{ApiKey, ServerConfig};
use vigil_server::state::AppState;
use vigil_storage::Store;

pub const KEY_A: &str = "key-org-a";
pub const KEY_B: &str = "key-org-b";

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub broker: Arc<MemoryBroker>,
    pub app: axum::Router,
}

/// App with two orgs (`org-a`, `org-b`), one API key each, a real SQLite
/// store and an in-memory broker nobody consumes from.
pub async fn build_test_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let store = Store::open_sqlite(temp_dir.path()).await?;
    let broker = Arc::new(MemoryBroker::new());

    let mut config = ServerConfig::default();
    config.database.data_dir = temp_dir.path().to_string_lossy().to_string();
    config.api.keys = vec![
        ApiKey {
            key: KEY_A.to_string(),
            org_id: "org-a".to_string(),
        },
        ApiKey {
            key: KEY_B.to_string(),
            org_id: "org-b".to_string(),
        },
    ];

    for org in ["org-a", "org-b"] {
        let now = Utc::now();
        store
            .create_org(&Org {
                id: org.to_string(),
                name: org.to_uppercase(),
                created_at: now,
                updated_at: now,
            })
            .await?;
    }

    let state = AppState::new(store, broker.clone(), config);
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        broker,
        app,
    })
}

pub async fn create_device(ctx: &TestContext, org_id: &str, id: &str, unique_id: &str) -> Device {
    let now = Utc::now();
    ctx.state
        .store
        .create_device(&Device {
            id: id.to_string(),
            org_id: org_id.to_string(),
            unique_id: unique_id.to_string(),
            name: format!("{id} sensor"),
            status: Status::Active,
            token: "device-token".to_string(),
            tags: vec!["door".to_string()],
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("create device should succeed")
}

pub async fn insert_event(
    ctx: &TestContext,
    org_id: &str,
    unique_id: &str,
    rule_id: &str,
    at: DateTime<Utc>,
) {
    ctx.state
        .store
        .create_event(&Event {
            id: String::new(),
            org_id: org_id.to_string(),
            unique_id: unique_id.to_string(),
            rule_id: rule_id.to_string(),
            created_at: at,
            trace_id: "seeded".to_string(),
        })
        .await
        .expect("create event should succeed");
}

pub async fn insert_alert(
    ctx: &TestContext,
    org_id: &str,
    unique_id: &str,
    alarm_id: &str,
    user_id: &str,
    at: DateTime<Utc>,
) {
    ctx.state
        .store
        .create_alert(&Alert {
            id: String::new(),
            org_id: org_id.to_string(),
            unique_id: unique_id.to_string(),
            alarm_id: alarm_id.to_string(),
            user_id: user_id.to_string(),
            status: AlertStatus::Sent,
            error: String::new(),
            created_at: at,
            trace_id: "seeded".to_string(),
        })
        .await
        .expect("create alert should succeed");
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("Authorization", format!("Bearer {key}"));
    }
    builder = builder.header("Content-Type", "application/json");

    let req_body = body.unwrap_or(Value::Null).to_string();
    let req = builder
        .body(Body::from(req_body))
        .expect("request should build");
    send(app, req).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
    key: Option<&str>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("Authorization", format!("Bearer {key}"));
    }
    let req = builder.body(Body::empty()).expect("request should build");
    send(app, req).await
}

pub fn assert_ok_envelope(json: &Value) {
    assert_eq!(json["err_code"], 0);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
}

pub fn assert_err_envelope(json: &Value, err_code: i32) {
    assert_eq!(json["err_code"], err_code);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
    assert!(json.get("data").is_some());
    assert!(json["data"].is_null());
}

pub fn decode_data<T: DeserializeOwned>(json: &Value) -> T {
    serde_json::from_value(json["data"].clone()).expect("data should decode")
}

/// RFC 3339 with a `Z` suffix, safe to put in a query string unescaped.
pub fn rfc3339(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
