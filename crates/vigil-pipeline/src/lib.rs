//! The three-stage telemetry pipeline.
//!
//! ```text
//! validator.in ──▶ Validator ──▶ eventer.in ──▶ Eventer ──▶ alerter.in ──▶ Alerter
//!                                               (Event rows)               (Alert rows)
//! ```
//!
//! Each stage is a [`Stage`]: bytes in, zero or more encoded messages out.
//! [`worker::WorkerPool`] runs a stage against a broker topic and turns the
//! stage's [`StageError`] into ack, redelivery or dead-lettering.

pub mod alerter;
pub mod error;
pub mod eventer;
pub mod validator;
pub mod worker;


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vigil_cache::Cache;
use vigil_notify::Notifiers;
use vigil_queue::Broker;
use vigil_storage::{PipelineStore, StorageError};

pub use alerter::{repeat_key, Alerter, AlerterSettings};
pub use error::{Disposition, Result, StageError};
pub use eventer::{evaluate_rules, Eventer};
pub use validator::Validator;
pub use worker::{RetryPolicy, WorkerPool};

/// One pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decodes `payload`, does the stage's work and returns the encoded
    /// messages to publish downstream.
    async fn process(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// Fails with [`StageError::TenantNotVisible`] when `org_id` cannot be read.
/// A fresh tenant may not have reached this replica yet.
pub(crate) async fn require_org(
    store: &dyn PipelineStore,
    org_id: &str,
    op_timeout: Duration,
    trace_id: &str,
) -> Result<()> {
    match error::timed(op_timeout, "read org", store.read_org(org_id)).await? {
        Ok(_) => Ok(()),
        Err(StorageError::NotFound { .. }) => {
            tracing::warn!(org_id = %org_id, trace_id = %trace_id, "Org not visible yet");
            Err(StageError::TenantNotVisible(org_id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub validator_workers: usize,
    #[serde(default = "default_workers")]
    pub eventer_workers: usize,
    #[serde(default = "default_workers")]
    pub alerter_workers: usize,
    /// Bound on each store or cache call.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// Bound on each notification send.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    #[serde(default = "default_max_transient_redeliveries")]
    pub max_transient_redeliveries: u32,
    #[serde(default = "default_repeat_interval_secs")]
    pub default_repeat_interval_secs: u64,
    #[serde(default = "default_validator_topic")]
    pub validator_topic: String,
    #[serde(default = "default_eventer_topic")]
    pub eventer_topic: String,
    #[serde(default = "default_alerter_topic")]
    pub alerter_topic: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validator_workers: default_workers(),
            eventer_workers: default_workers(),
            alerter_workers: default_workers(),
            op_timeout_ms: default_op_timeout_ms(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            max_transient_redeliveries: default_max_transient_redeliveries(),
            default_repeat_interval_secs: default_repeat_interval_secs(),
            validator_topic: default_validator_topic(),
            eventer_topic: default_eventer_topic(),
            alerter_topic: default_alerter_topic(),
        }
    }
}

impl PipelineConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(self.retry_base_ms),
            max: Duration::from_millis(self.retry_max_ms),
            max_transient: self.max_transient_redeliveries,
        }
    }

    /// Input topics of the three stages, in pipeline order.
    pub fn topics(&self) -> [&str; 3] {
        [
            self.validator_topic.as_str(),
            self.eventer_topic.as_str(),
            self.alerter_topic.as_str(),
        ]
    }

    pub fn alerter_settings(&self) -> AlerterSettings {
        AlerterSettings {
            op_timeout: self.op_timeout(),
            dispatch_timeout: Duration::from_millis(self.dispatch_timeout_ms),
            default_repeat: Duration::from_secs(self.default_repeat_interval_secs),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_op_timeout_ms() -> u64 {
    5_000
}

fn default_dispatch_timeout_ms() -> u64 {
    10_000
}

fn default_retry_base_ms() -> u64 {
    100
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn default_max_transient_redeliveries() -> u32 {
    5
}

fn default_repeat_interval_secs() -> u64 {
    3600
}

fn default_validator_topic() -> String {
    "validator.in".to_string()
}

fn default_eventer_topic() -> String {
    "eventer.in".to_string()
}

fn default_alerter_topic() -> String {
    "alerter.in".to_string()
}

/// Collaborators shared by all three stages.
#[derive(Clone)]
pub struct PipelineDeps {
    pub broker: Arc<dyn Broker>,
    pub store: Arc<dyn PipelineStore>,
    pub cache: Arc<dyn Cache>,
    pub notifiers: Notifiers,
}

/// Running worker pools of all three stages.
pub struct Pipeline {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Subscribes every stage and starts its workers.
    pub async fn start(config: &PipelineConfig, deps: PipelineDeps) -> vigil_queue::Result<Self> {
        let (shutdown, rx) = watch::channel(false);
        let retry = config.retry_policy();
        let op_timeout = config.op_timeout();

        let pools = [
            WorkerPool {
                stage: Arc::new(Validator::new(deps.store.clone(), op_timeout)),
                broker: deps.broker.clone(),
                input: config.validator_topic.clone(),
                output: Some(config.eventer_topic.clone()),
                workers: config.validator_workers,
                retry,
            },
            WorkerPool {
                stage: Arc::new(Eventer::new(deps.store.clone(), op_timeout)),
                broker: deps.broker.clone(),
                input: config.eventer_topic.clone(),
                output: Some(config.alerter_topic.clone()),
                workers: config.eventer_workers,
                retry,
            },
            WorkerPool {
                stage: Arc::new(Alerter::new(
                    deps.store.clone(),
                    deps.cache.clone(),
                    deps.notifiers.clone(),
                    config.alerter_settings(),
                )),
                broker: deps.broker.clone(),
                input: config.alerter_topic.clone(),
                output: None,
                workers: config.alerter_workers,
                retry,
            },
        ];

        let mut handles = Vec::new();
        for pool in pools {
            handles.extend(pool.spawn(rx.clone()).await?);
        }
        Ok(Self { shutdown, handles })
    }

    /// Signals every worker and waits for in-flight messages to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Pipeline worker panicked");
            }
        }
        tracing::info!("Pipeline stopped");
    }
}
