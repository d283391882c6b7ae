use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{NotifyError, Result};
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::Notifier;

/// `[notify.app]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub gateway_url: String,
    pub api_token: String,
}

/// Delivers in-app push notifications through an HTTP push gateway. The
/// recipient is the user's app key.
pub struct AppChannel {
    client: reqwest::Client,
    gateway_url: String,
    api_token: String,
}

impl AppChannel {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: config.gateway_url.clone(),
            api_token: config.api_token.clone(),
        }
    }
}

#[async_trait]
impl Notifier for AppChannel {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        if recipient.trim().is_empty() {
            return Err(NotifyError::InvalidRecipient(recipient.to_string()));
        }
        let payload = serde_json::json!({
            "token": self.api_token,
            "user": recipient,
            "title": subject,
            "message": body,
        });

        let resp = self
            .client
            .post(&self.gateway_url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        tracing::warn!(status = %status, "Push gateway rejected notification");
        Err(NotifyError::ApiError {
            service: "app".to_string(),
            status: status.as_u16(),
            body: truncate_string(&text, MAX_BODY_LENGTH),
        })
    }

    fn channel_name(&self) -> &str {
        "app"
    }
}
