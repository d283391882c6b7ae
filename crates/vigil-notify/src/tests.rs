use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use vigil_common::types::AlarmType;

use crate::{
    AppChannel, AppConfig, EmailChannel, EmailConfig, Notifier, Notifiers, NotifyError,
    SmsChannel, SmsConfig,
};

type Seen = Arc<Mutex<Vec<(String, Value)>>>;

/// Local HTTP gateway that fails the first `fail_first` requests with 503.
async fn spawn_gateway(fail_first: usize) -> (String, Seen) {
    async fn handler(
        State((seen, remaining_failures)): State<(Seen, Arc<AtomicUsize>)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        seen.lock().unwrap().push((auth, body));
        let failing = remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        }
    }

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let state = (seen.clone(), Arc::new(AtomicUsize::new(fail_first)));
    let app = Router::new().route("/send", post(handler)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/send"), seen)
}

fn sms_config(url: &str) -> SmsConfig {
    SmsConfig {
        gateway_url: url.to_string(),
        api_key: "sms-key".into(),
        from: "+15550000".into(),
        retry_base_ms: 1,
    }
}

#[tokio::test]
async fn unconfigured_channels_fail_with_not_configured() {
    let notifiers = Notifiers::new();
    let sms = notifiers.for_type(AlarmType::Sms).unwrap();
    let err = sms.send("+15551234", "s", "b").await.unwrap_err();
    assert!(matches!(err, NotifyError::NotConfigured(ref c) if c == "sms"));
    assert!(err.to_string().contains("channel not configured"));
    assert!(notifiers.for_type(AlarmType::Unspecified).is_none());
}

#[tokio::test]
async fn with_replaces_only_the_given_type() {
    let (url, _seen) = spawn_gateway(0).await;
    let notifiers =
        Notifiers::new().with(AlarmType::Sms, Arc::new(SmsChannel::new(&sms_config(&url))));
    assert_eq!(notifiers.for_type(AlarmType::Sms).unwrap().channel_name(), "sms");
    assert!(notifiers
        .for_type(AlarmType::Email)
        .unwrap()
        .send("a@example.com", "s", "b")
        .await
        .is_err());
}

#[tokio::test]
async fn sms_posts_truncated_text_with_bearer_auth() {
    let (url, seen) = spawn_gateway(0).await;
    let channel = SmsChannel::new(&sms_config(&url));
    let body = "b".repeat(400);
    channel.send("+15551234", "Door open", &body).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (auth, payload) = &seen[0];
    assert_eq!(auth, "Bearer sms-key");
    assert_eq!(payload["to"], "+15551234");
    assert_eq!(payload["from"], "+15550000");
    let message = payload["message"].as_str().unwrap();
    assert!(message.starts_with("Door open - bbb"));
    assert_eq!(message.chars().count(), 160);
}

#[tokio::test]
async fn sms_retries_transient_gateway_errors() {
    let (url, seen) = spawn_gateway(2).await;
    let channel = SmsChannel::new(&sms_config(&url));
    channel.send("+15551234", "s", "b").await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn sms_gives_up_after_three_attempts() {
    let (url, seen) = spawn_gateway(10).await;
    let channel = SmsChannel::new(&sms_config(&url));
    let err = channel.send("+15551234", "s", "b").await.unwrap_err();
    assert!(matches!(err, NotifyError::ApiError { status: 503, .. }));
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn app_push_payload() {
    let (url, seen) = spawn_gateway(0).await;
    let channel = AppChannel::new(&AppConfig {
        gateway_url: url,
        api_token: "app-token".into(),
    });
    channel
        .send("uQiRzpo4DXghDmr9QzzfQu27cmVRsG", "Motion", "Garage")
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let (auth, payload) = &seen[0];
    assert_eq!(auth, "Bearer app-token");
    assert_eq!(payload["token"], "app-token");
    assert_eq!(payload["user"], "uQiRzpo4DXghDmr9QzzfQu27cmVRsG");
    assert_eq!(payload["title"], "Motion");
    assert_eq!(payload["message"], "Garage");
}

#[tokio::test]
async fn app_push_does_not_retry() {
    let (url, seen) = spawn_gateway(1).await;
    let channel = AppChannel::new(&AppConfig {
        gateway_url: url,
        api_token: "t".into(),
    });
    assert!(channel.send("key", "s", "b").await.is_err());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn email_rejects_invalid_recipient_before_sending() {
    let channel = EmailChannel::new(&EmailConfig {
        smtp_host: "localhost".into(),
        smtp_port: 2525,
        username: None,
        password: None,
        from: "vigil@example.com".into(),
    })
    .unwrap();
    let err = channel.send("not an address", "s", "b").await.unwrap_err();
    assert!(matches!(err, NotifyError::InvalidRecipient(_)));
}

#[test]
fn email_rejects_invalid_sender() {
    let result = EmailChannel::new(&EmailConfig {
        smtp_host: "localhost".into(),
        smtp_port: 2525,
        username: None,
        password: None,
        from: "nobody".into(),
    });
    assert!(matches!(result, Err(NotifyError::InvalidConfig(_))));
}
