use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prost::Message;
use vigil_cache::Cache;
use vigil_common::proto::{DataPoint, Device, EventerOut};
use vigil_common::types::{Alarm, Alert, AlertStatus, User};
use vigil_expr::{render, Env};
use vigil_notify::Notifiers;
use vigil_storage::PipelineStore;

use crate::error::{timed, Result, StageError};
use crate::{require_org, Stage};

/// Dedup key for one (org, device, alarm, recipient).
///
/// Each component is written as `{byte_len}:{value}`. Ids may contain `:`
/// (MAC-style unique ids do), and the length prefix keeps distinct tuples
/// from ever sharing a key.
pub fn repeat_key(org_id: &str, unique_id: &str, alarm_id: &str, user_id: &str) -> String {
    format!(
        "vigil:repeat:org:{}:dev:{}:alarm:{}:user:{}",
        framed(org_id),
        framed(unique_id),
        framed(alarm_id),
        framed(user_id)
    )
}

fn framed(component: &str) -> String {
    format!("{}:{component}", component.len())
}

/// Timeouts and windows the Alerter works with.
#[derive(Debug, Clone, Copy)]
pub struct AlerterSettings {
    pub op_timeout: Duration,
    pub dispatch_timeout: Duration,
    /// Window used for alarms whose repeat interval is zero.
    pub default_repeat: Duration,
}

/// Turns rule matches into at most one notification per recipient per
/// repeat window, and records every attempt as an Alert.
pub struct Alerter {
    store: Arc<dyn PipelineStore>,
    cache: Arc<dyn Cache>,
    notifiers: Notifiers,
    settings: AlerterSettings,
}

impl Alerter {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        cache: Arc<dyn Cache>,
        notifiers: Notifiers,
        settings: AlerterSettings,
    ) -> Self {
        Self {
            store,
            cache,
            notifiers,
            settings,
        }
    }

    /// Returns the Alerts written for this message. An empty result means
    /// nothing was configured, nobody was eligible, or every recipient was
    /// still inside its repeat window.
    pub async fn handle(&self, msg: EventerOut, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        let point = msg
            .point
            .ok_or_else(|| StageError::Malformed("missing point".into()))?;
        let device = msg
            .device
            .ok_or_else(|| StageError::Malformed("missing device".into()))?;
        let rule = msg
            .rule
            .ok_or_else(|| StageError::Malformed("missing rule".into()))?;
        if device.org_id.is_empty() || rule.org_id != device.org_id {
            return Err(StageError::Rejected(format!(
                "rule {} is not in the device's org",
                rule.id
            )));
        }
        let org_id = device.org_id.as_str();
        let op_timeout = self.settings.op_timeout;

        let alarms: Vec<Alarm> = timed(
            op_timeout,
            "list alarms",
            self.store.list_alarms_by_rule(org_id, &rule.id),
        )
        .await??
        .into_iter()
        .filter(Alarm::is_dispatchable)
        .collect();
        if alarms.is_empty() {
            tracing::debug!(rule_id = %rule.id, trace_id = %point.trace_id, "No active alarm for rule");
            return Ok(Vec::new());
        }

        require_org(self.store.as_ref(), org_id, op_timeout, &point.trace_id).await?;

        let env = Env::for_point(&point, &rule, &device, now);
        let mut written = Vec::new();
        for alarm in &alarms {
            let users = timed(
                op_timeout,
                "list users",
                self.store.list_users_by_tags(org_id, &alarm.user_tags),
            )
            .await??;

            for user in &users {
                if let Some(alert) = self
                    .notify_user(alarm, user, &point, &device, &env, now)
                    .await?
                {
                    written.push(alert);
                }
            }
        }
        Ok(written)
    }

    async fn notify_user(
        &self,
        alarm: &Alarm,
        user: &User,
        point: &DataPoint,
        device: &Device,
        env: &Env,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let Some(contact) = user.contact_for(alarm.alarm_type) else {
            tracing::debug!(
                alarm_id = %alarm.id,
                user_id = %user.id,
                channel = %alarm.alarm_type,
                "User has no contact for channel"
            );
            return Ok(None);
        };

        let key = repeat_key(&device.org_id, &device.unique_id, &alarm.id, &user.id);
        let acquired = timed(
            self.settings.op_timeout,
            "acquire repeat lock",
            self.cache.try_acquire(&key, self.repeat_window(alarm)),
        )
        .await??;
        if !acquired {
            tracing::debug!(
                alarm_id = %alarm.id,
                user_id = %user.id,
                trace_id = %point.trace_id,
                "Inside repeat window, alert absorbed"
            );
            return Ok(None);
        }

        let (status, error) = match self.dispatch(alarm, contact, env).await {
            Ok(()) => (AlertStatus::Sent, String::new()),
            Err(e) => (AlertStatus::Error, e),
        };
        let alert = Alert {
            id: vigil_common::id::next_id(),
            org_id: device.org_id.clone(),
            unique_id: device.unique_id.clone(),
            alarm_id: alarm.id.clone(),
            user_id: user.id.clone(),
            status,
            error,
            created_at: now,
            trace_id: point.trace_id.clone(),
        };

        timed(self.settings.op_timeout, "create alert", self.store.create_alert(&alert))
            .await?
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    alarm_id = %alarm.id,
                    user_id = %user.id,
                    trace_id = %point.trace_id,
                    "Failed to write alert"
                );
                StageError::Infrastructure(e.to_string())
            })?;

        match alert.status {
            AlertStatus::Sent => tracing::info!(
                alarm_id = %alarm.id,
                user_id = %user.id,
                channel = %alarm.alarm_type,
                trace_id = %point.trace_id,
                "Alert sent"
            ),
            AlertStatus::Error => tracing::warn!(
                alarm_id = %alarm.id,
                user_id = %user.id,
                channel = %alarm.alarm_type,
                error = %alert.error,
                trace_id = %point.trace_id,
                "Alert failed"
            ),
        }
        Ok(Some(alert))
    }

    /// Renders and sends. The error text ends up on the Alert row.
    async fn dispatch(
        &self,
        alarm: &Alarm,
        contact: &str,
        env: &Env,
    ) -> std::result::Result<(), String> {
        let subject = render(&alarm.subject_template, env).map_err(|e| e.to_string())?;
        let body = render(&alarm.body_template, env).map_err(|e| e.to_string())?;

        let notifier = self
            .notifiers
            .for_type(alarm.alarm_type)
            .ok_or_else(|| format!("no channel for alarm type {}", alarm.alarm_type))?;
        let limit = self.settings.dispatch_timeout;
        match tokio::time::timeout(limit, notifier.send(contact, &subject, &body)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!(
                "{} dispatch timed out after {}ms",
                notifier.channel_name(),
                limit.as_millis()
            )),
        }
    }

    fn repeat_window(&self, alarm: &Alarm) -> Duration {
        match alarm.repeat_interval_secs {
            0 => self.settings.default_repeat,
            secs => Duration::from_secs(u64::from(secs)),
        }
    }
}

#[async_trait]
impl Stage for Alerter {
    fn name(&self) -> &'static str {
        "alerter"
    }

    async fn process(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>> {
        let msg = EventerOut::decode(payload)?;
        self.handle(msg, Utc::now()).await?;
        Ok(Vec::new())
    }
}
