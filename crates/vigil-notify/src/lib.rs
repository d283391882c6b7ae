//! Notification dispatch for alarms.
//!
//! Each alarm type maps to exactly one [`Notifier`]: in-app push, SMS or
//! email. [`Notifiers`] performs that selection; a type without a configured
//! channel resolves to a notifier that always fails with
//! [`NotifyError::NotConfigured`], so the attempt is still audited.

pub mod channels;
pub mod error;
pub mod utils;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use vigil_common::types::AlarmType;

pub use channels::{AppChannel, AppConfig, EmailChannel, EmailConfig, SmsChannel, SmsConfig};
pub use error::{NotifyError, Result};

/// A notification delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one message to one recipient. `recipient` is the contact
    /// detail the channel understands (app key, phone number, email address).
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after the channel's own retries.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;

    /// Returns the channel type name (e.g., `"email"`, `"sms"`).
    fn channel_name(&self) -> &str;
}

/// Stand-in for a channel type the server has no configuration for.
pub struct Unconfigured {
    name: String,
}

impl Unconfigured {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Notifier for Unconfigured {
    async fn send(&self, _recipient: &str, _subject: &str, _body: &str) -> Result<()> {
        Err(NotifyError::NotConfigured(self.name.clone()))
    }

    fn channel_name(&self) -> &str {
        &self.name
    }
}

/// `[notify]` section: every channel is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    pub app: Option<AppConfig>,
    pub sms: Option<SmsConfig>,
    pub email: Option<EmailConfig>,
}

/// Channel selection by alarm type.
#[derive(Clone)]
pub struct Notifiers {
    app: Arc<dyn Notifier>,
    sms: Arc<dyn Notifier>,
    email: Arc<dyn Notifier>,
}

impl Default for Notifiers {
    fn default() -> Self {
        Self {
            app: Arc::new(Unconfigured::new("app")),
            sms: Arc::new(Unconfigured::new("sms")),
            email: Arc::new(Unconfigured::new("email")),
        }
    }
}

impl Notifiers {
    /// All channels unconfigured.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let mut notifiers = Self::new();
        if let Some(app) = &config.app {
            notifiers = notifiers.with(AlarmType::App, Arc::new(AppChannel::new(app)));
        }
        if let Some(sms) = &config.sms {
            notifiers = notifiers.with(AlarmType::Sms, Arc::new(SmsChannel::new(sms)));
        }
        if let Some(email) = &config.email {
            notifiers = notifiers.with(AlarmType::Email, Arc::new(EmailChannel::new(email)?));
        }
        tracing::info!(
            app = config.app.is_some(),
            sms = config.sms.is_some(),
            email = config.email.is_some(),
            "Notification channels configured"
        );
        Ok(notifiers)
    }

    /// Replaces the channel used for `alarm_type`. `Unspecified` is ignored.
    pub fn with(mut self, alarm_type: AlarmType, notifier: Arc<dyn Notifier>) -> Self {
        match alarm_type {
            AlarmType::App => self.app = notifier,
            AlarmType::Sms => self.sms = notifier,
            AlarmType::Email => self.email = notifier,
            AlarmType::Unspecified => {}
        }
        self
    }

    /// The channel for `alarm_type`; `None` for `Unspecified`.
    pub fn for_type(&self, alarm_type: AlarmType) -> Option<Arc<dyn Notifier>> {
        match alarm_type {
            AlarmType::App => Some(self.app.clone()),
            AlarmType::Sms => Some(self.sms.clone()),
            AlarmType::Email => Some(self.email.clone()),
            AlarmType::Unspecified => None,
        }
    }
}
