use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{NotifyError, Result};
use crate::utils::{sms_text, truncate_string, MAX_BODY_LENGTH};
use crate::Notifier;

const MAX_ATTEMPTS: u32 = 3;

/// `[notify.sms]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub api_key: String,
    /// Sender number or alphanumeric sender id.
    pub from: String,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_retry_base_ms() -> u64 {
    100
}

/// Sends text messages through an HTTP SMS gateway that accepts
/// `{to, from, message}` with bearer authentication.
pub struct SmsChannel {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
    from: String,
    retry_base: Duration,
}

impl SmsChannel {
    pub fn new(config: &SmsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: config.gateway_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            retry_base: Duration::from_millis(config.retry_base_ms),
        }
    }

    async fn post_once(&self, payload: &serde_json::Value) -> Result<()> {
        let resp = self
            .client
            .post(&self.gateway_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(payload)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(NotifyError::ApiError {
            service: "sms".to_string(),
            status: status.as_u16(),
            body: truncate_string(&body, MAX_BODY_LENGTH),
        })
    }
}

#[async_trait]
impl Notifier for SmsChannel {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        if recipient.trim().is_empty() {
            return Err(NotifyError::InvalidRecipient(recipient.to_string()));
        }
        let payload = serde_json::json!({
            "to": recipient,
            "from": self.from,
            "message": sms_text(subject, body),
        });

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.post_once(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        phone = %recipient,
                        error = %e,
                        "SMS send failed, retrying"
                    );
                    last_err = Some(e);
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(self.retry_base * 2u32.pow(attempt)).await;
            }
        }

        tracing::error!(phone = %recipient, "SMS failed after {MAX_ATTEMPTS} attempts");
        Err(last_err.unwrap_or_else(|| NotifyError::InvalidConfig("no attempts made".into())))
    }

    fn channel_name(&self) -> &str {
        "sms"
    }
}
