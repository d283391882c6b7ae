mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::*;
use prost::Message;
use serde_json::{json, Value};
use std::sync::Arc;
use vigil_common::proto::{data_point, ValidatorIn};
use vigil_pipeline::{StageError, Validator};

#[tokio::test]
async fn health_needs_no_key() {
    let ctx = build_test_context().await.expect("context should build");
    let (status, body, trace_id) = request_no_body(&ctx.app, "GET", "/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["data"]["uptime_secs"].as_i64().unwrap() >= 0);
    let trace_id = trace_id.expect("trace id header should be set");
    assert_eq!(trace_id.len(), 16);
    assert_eq!(body["trace_id"], trace_id);
}

#[tokio::test]
async fn protected_routes_require_a_known_key() {
    let ctx = build_test_context().await.expect("context should build");

    let (status, body, trace_id) = request_no_body(&ctx.app, "GET", "/v1/events", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);
    assert!(trace_id.is_some());

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/events", Some("not-a-key")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/points",
        None,
        Some(json!({"unique_id": "x", "attr": "a", "value": {"int": 1}})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);
    assert!(ctx.broker.take_queued("validator.in").await.is_empty());
}

#[tokio::test]
async fn published_point_is_queued_for_the_callers_org() {
    let ctx = build_test_context().await.expect("context should build");

    let (status, body, trace_id) = request_json(
        &ctx.app,
        "POST",
        "/v1/points",
        Some(KEY_A),
        Some(json!({
            "unique_id": " Door-1 ",
            "attr": "open",
            "value": {"bool": true},
            "ts_ms": 1_700_000_000_000i64
        })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["unique_id"], "door-1");

    let queued = ctx.broker.take_queued("validator.in").await;
    assert_eq!(queued.len(), 1);
    let msg = ValidatorIn::decode(queued[0].as_slice()).expect("payload should decode");
    assert_eq!(msg.org_id, "org-a");
    assert!(msg.skip_token);

    let point = msg.point.expect("point should be present");
    assert_eq!(point.unique_id, "door-1");
    assert_eq!(point.attr, "open");
    assert_eq!(point.value, Some(data_point::Value::BoolVal(true)));
    assert_eq!(point.ts_ms, Some(1_700_000_000_000));
    assert!(point.token.is_empty());
    assert_eq!(Some(point.trace_id), trace_id);
}

#[tokio::test]
async fn device_ingest_carries_the_device_token_and_no_org() {
    let ctx = build_test_context().await.expect("context should build");
    create_device(&ctx, "org-a", "d1", "door-1").await;

    let (status, body, trace_id) = request_json(
        &ctx.app,
        "POST",
        "/v1/device/points",
        Some("device-token"),
        Some(json!({"unique_id": "DOOR-1", "attr": "open", "value": {"bool": true}})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["unique_id"], "door-1");

    let queued = ctx.broker.take_queued("validator.in").await;
    assert_eq!(queued.len(), 1);
    let msg = ValidatorIn::decode(queued[0].as_slice()).expect("payload should decode");
    assert!(msg.org_id.is_empty());
    assert!(!msg.skip_token);
    let point = msg.point.clone().expect("point should be present");
    assert_eq!(point.token, "device-token");
    assert_eq!(Some(point.trace_id), trace_id);

    // The Validator resolves the org from the device and accepts the token.
    let validator = Validator::new(
        Arc::new(ctx.state.store.clone()),
        std::time::Duration::from_secs(2),
    );
    let out = validator
        .validate(msg, Utc::now())
        .await
        .expect("token should match");
    assert_eq!(out.device.expect("device should be attached").org_id, "org-a");
    assert!(out.point.expect("point should be present").token.is_empty());
}

#[tokio::test]
async fn device_ingest_with_a_wrong_token_is_rejected_by_the_validator() {
    let ctx = build_test_context().await.expect("context should build");
    create_device(&ctx, "org-a", "d1", "door-1").await;

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/device/points",
        Some("stolen"),
        Some(json!({"unique_id": "door-1", "attr": "open", "value": {"bool": true}})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let queued = ctx.broker.take_queued("validator.in").await;
    let msg = ValidatorIn::decode(queued[0].as_slice()).expect("payload should decode");
    let validator = Validator::new(
        Arc::new(ctx.state.store.clone()),
        std::time::Duration::from_secs(2),
    );
    let err = validator
        .validate(msg, Utc::now())
        .await
        .expect_err("token should not match");
    assert!(matches!(err, StageError::Rejected(_)));
}

#[tokio::test]
async fn device_ingest_requires_a_token_and_never_claims_an_org() {
    let ctx = build_test_context().await.expect("context should build");
    let point = json!({"unique_id": "door-1", "attr": "open", "value": {"bool": true}});

    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/device/points", None, Some(point.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/device/points",
        Some("device-token"),
        Some(json!({"unique_id": "door-1", "attr": "open"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
    assert!(ctx.broker.take_queued("validator.in").await.is_empty());

    // An API key is just an unknown device token here; no org is claimed.
    let (status, _, _) =
        request_json(&ctx.app, "POST", "/v1/device/points", Some(KEY_A), Some(point)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let queued = ctx.broker.take_queued("validator.in").await;
    let msg = ValidatorIn::decode(queued[0].as_slice()).expect("payload should decode");
    assert!(msg.org_id.is_empty());
    assert!(!msg.skip_token);
}

#[tokio::test]
async fn point_value_kinds_map_to_the_wire() {
    let ctx = build_test_context().await.expect("context should build");

    for value in [
        json!({"int": 7}),
        json!({"float": 1.5}),
        json!({"str": "hi"}),
        json!({"bytes": "AAEC"}),
        json!({"map": {"k": "v"}}),
    ] {
        let (status, _, _) = request_json(
            &ctx.app,
            "POST",
            "/v1/points",
            Some(KEY_B),
            Some(json!({"unique_id": "b-1", "attr": "x", "value": value})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let values: Vec<_> = ctx
        .broker
        .take_queued("validator.in")
        .await
        .into_iter()
        .map(|raw| {
            let msg = ValidatorIn::decode(raw.as_slice()).unwrap();
            assert_eq!(msg.org_id, "org-b");
            msg.point.unwrap().value.unwrap()
        })
        .collect();
    assert_eq!(values.len(), 5);
    assert_eq!(values[0], data_point::Value::IntVal(7));
    assert_eq!(values[3], data_point::Value::BytesVal(vec![0, 1, 2]));
    match &values[4] {
        data_point::Value::MapVal(map) => assert_eq!(map.entries["k"], "v"),
        other => panic!("expected map, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_points_are_rejected_before_publishing() {
    let ctx = build_test_context().await.expect("context should build");

    let bad_bodies = [
        json!({"unique_id": "x", "attr": "a"}),
        json!({"unique_id": "x", "attr": "a", "value": {"bytes": "%%%"}}),
        json!({"unique_id": "   ", "attr": "a", "value": {"int": 1}}),
        json!({"unique_id": "x", "attr": "", "value": {"int": 1}}),
        json!({"unique_id": "x", "attr": "a", "value": {"int": 1, "bool": true}}),
    ];
    for bad in bad_bodies {
        let (status, body, _) =
            request_json(&ctx.app, "POST", "/v1/points", Some(KEY_A), Some(bad.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {bad} should be rejected");
        assert_err_envelope(&body, 1001);
    }
    assert!(ctx.broker.take_queued("validator.in").await.is_empty());
}

#[tokio::test]
async fn rule_test_evaluates_against_sample_bindings() {
    let ctx = build_test_context().await.expect("context should build");

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/rules/test",
        Some(KEY_A),
        Some(json!({
            "expr": "pointVal > 20 && device.name == 'lab' && 'T' in device.tags",
            "point": {"unique_id": "lab-1", "attr": "temp", "value": {"float": 21.5}},
            "device": {"name": "lab", "tags": ["T"]}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["result"], true);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/rules/test",
        Some(KEY_A),
        Some(json!({
            "expr": "rule.attr == 'temp' && point.unique_id == 'lab-1' && pointVal < 0",
            "point": {"unique_id": "LAB-1", "attr": "temp", "value": {"int": 3}}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], false);
}

#[tokio::test]
async fn rule_test_rejects_pathologically_nested_expressions() {
    let ctx = build_test_context().await.expect("context should build");
    let point = json!({"unique_id": "x", "attr": "n", "value": {"bool": true}});

    for expr in [
        format!("{}true", "!".repeat(20_000)),
        format!("{}pointVal{}", "(".repeat(1_000), ")".repeat(1_000)),
    ] {
        let (status, body, _) = request_json(
            &ctx.app,
            "POST",
            "/v1/rules/test",
            Some(KEY_A),
            Some(json!({"expr": expr, "point": point})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_err_envelope(&body, 1001);
    }
}

#[tokio::test]
async fn rule_test_reports_evaluation_errors_as_invalid_format() {
    let ctx = build_test_context().await.expect("context should build");
    let point = json!({"unique_id": "x", "attr": "n", "value": {"int": 5}});

    for expr in ["pointVal +", "nosuch > 1", "pointVal + 1", "pointVal % 0"] {
        let (status, body, _) = request_json(
            &ctx.app,
            "POST",
            "/v1/rules/test",
            Some(KEY_A),
            Some(json!({"expr": expr, "point": point})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "expr {expr:?}");
        assert_err_envelope(&body, 1001);
    }
}

#[tokio::test]
async fn rule_test_only_loads_devices_of_the_callers_org() {
    let ctx = build_test_context().await.expect("context should build");
    create_device(&ctx, "org-b", "dev-b", "B-1").await;

    let req = json!({
        "expr": "device.unique_id == 'b-1' && device.org_id == 'org-b'",
        "point": {"unique_id": "b-1", "attr": "open", "value": {"bool": true}},
        "device": {"id": "dev-b"}
    });

    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/rules/test", Some(KEY_A), Some(req.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);

    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/rules/test", Some(KEY_B), Some(req)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], true);
}

#[tokio::test]
async fn alarm_test_renders_subject_and_body() {
    let ctx = build_test_context().await.expect("context should build");

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alarms/test",
        Some(KEY_A),
        Some(json!({
            "subject_template": "{{device.name}} {{point.attr}}",
            "body_template": "{{rule.name}}: value={{pointVal}} <{{missing}}>",
            "point": {"unique_id": "d-1", "attr": "open", "value": {"bool": true}},
            "device": {"name": "Front & Back"},
            "rule": {"name": "door open"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["subject"], "Front & Back open");
    assert_eq!(body["data"]["body"], "door open: value=true <>");
}

#[tokio::test]
async fn alarm_test_reports_template_errors_as_invalid_format() {
    let ctx = build_test_context().await.expect("context should build");

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alarms/test",
        Some(KEY_A),
        Some(json!({
            "subject_template": "ok",
            "body_template": "{{#if pointVal}}never closed",
            "point": {"unique_id": "d-1", "attr": "open", "value": {"bool": true}}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alarms/test",
        Some(KEY_A),
        Some(json!({"subject_template": "ok"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
}

fn items(body: &Value) -> Vec<Value> {
    body["data"]["items"]
        .as_array()
        .expect("items should be an array")
        .clone()
}

#[tokio::test]
async fn events_are_paged_newest_first_with_a_cursor() {
    let ctx = build_test_context().await.expect("context should build");
    let now = Utc::now();
    insert_event(&ctx, "org-a", "a-1", "r1", now - Duration::hours(3)).await;
    insert_event(&ctx, "org-a", "a-1", "r1", now - Duration::hours(1)).await;
    insert_event(&ctx, "org-a", "a-2", "r2", now - Duration::hours(2)).await;
    insert_event(&ctx, "org-a", "a-1", "r1", now - Duration::days(2)).await;
    insert_event(&ctx, "org-b", "b-1", "rb", now - Duration::hours(1)).await;

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/events?limit=2", Some(KEY_A)).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    let first = items(&body);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0]["unique_id"], "a-1");
    assert_eq!(first[1]["unique_id"], "a-2");
    let cursor = body["data"]["next_cursor"]
        .as_str()
        .expect("a second page should exist")
        .to_string();

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/events?limit=2&cursor={cursor}"),
        Some(KEY_A),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second = items(&body);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0]["rule_id"], "r1");
    assert!(body["data"]["next_cursor"].is_null());

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/events", Some(KEY_B)).await;
    let other = items(&body);
    assert_eq!(other.len(), 1);
    assert_eq!(other[0]["org_id"], "org-b");
}

#[tokio::test]
async fn events_honour_window_and_filters() {
    let ctx = build_test_context().await.expect("context should build");
    let now = Utc::now();
    create_device(&ctx, "org-a", "dev-a", "a-1").await;
    create_device(&ctx, "org-b", "dev-b", "b-1").await;
    insert_event(&ctx, "org-a", "a-1", "r1", now - Duration::hours(1)).await;
    insert_event(&ctx, "org-a", "a-2", "r2", now - Duration::hours(1)).await;
    insert_event(&ctx, "org-a", "a-1", "r2", now - Duration::days(2)).await;

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/events?rule_id=r2", Some(KEY_A)).await;
    assert_eq!(items(&body).len(), 1);

    let start = rfc3339(now - Duration::days(3));
    let (_, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/events?rule_id=r2&start={start}"),
        Some(KEY_A),
    )
    .await;
    assert_eq!(items(&body).len(), 2);

    let (_, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/events?device_id=dev-a", Some(KEY_A)).await;
    let by_device = items(&body);
    assert_eq!(by_device.len(), 1);
    assert_eq!(by_device[0]["unique_id"], "a-1");

    let (_, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/events?unique_id=A-2", Some(KEY_A)).await;
    assert_eq!(items(&body).len(), 1);

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/events?device_id=dev-b", Some(KEY_A)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events?device_id=dev-a&unique_id=a-2",
        Some(KEY_A),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
}

#[tokio::test]
async fn invalid_listing_parameters_are_rejected() {
    let ctx = build_test_context().await.expect("context should build");
    let now = Utc::now();

    let reversed = format!(
        "/v1/events?start={}&end={}",
        rfc3339(now),
        rfc3339(now - Duration::hours(1))
    );
    let too_wide = format!("/v1/alerts?start={}", rfc3339(now - Duration::days(91)));

    for uri in [
        reversed.as_str(),
        too_wide.as_str(),
        "/v1/events?cursor=@@@",
        "/v1/alerts?limit=many",
        "/v1/events?start=yesterday",
    ] {
        let (status, body, _) = request_no_body(&ctx.app, "GET", uri, Some(KEY_A)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {uri}");
        assert_err_envelope(&body, 1001);
    }
}

#[tokio::test]
async fn alerts_filter_by_alarm_and_user_within_the_org() {
    let ctx = build_test_context().await.expect("context should build");
    let now = Utc::now();
    insert_alert(&ctx, "org-a", "a-1", "al1", "u1", now - Duration::minutes(10)).await;
    insert_alert(&ctx, "org-a", "a-1", "al1", "u2", now - Duration::minutes(20)).await;
    insert_alert(&ctx, "org-a", "a-1", "al2", "u1", now - Duration::minutes(30)).await;
    insert_alert(&ctx, "org-b", "b-1", "al1", "u1", now - Duration::minutes(5)).await;

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/alerts", Some(KEY_A)).await;
    assert_eq!(status, StatusCode::OK);
    let all = items(&body);
    assert_eq!(all.len(), 3);
    assert_eq!(all[0]["user_id"], "u1");
    assert_eq!(all[0]["status"], "sent");
    assert!(body["data"]["next_cursor"].is_null());

    let (_, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/alerts?alarm_id=al1", Some(KEY_A)).await;
    assert_eq!(items(&body).len(), 2);

    let (_, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/alerts?alarm_id=al1&user_id=u1",
        Some(KEY_A),
    )
    .await;
    let one = items(&body);
    assert_eq!(one.len(), 1);
    assert_eq!(one[0]["org_id"], "org-a");
}
