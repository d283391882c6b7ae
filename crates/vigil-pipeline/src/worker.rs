use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use vigil_queue::{dead_letter_topic, Broker, Delivery, Subscription};

use crate::error::{Disposition, StageError};
use crate::Stage;

/// Redelivery delays and the transient retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Redeliveries allowed for [`StageError::TenantNotVisible`] before the
    /// message is dead-lettered.
    pub max_transient: u32,
}

impl RetryPolicy {
    /// `min(base * 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// `workers` tasks competing for one subscription, feeding one stage.
pub struct WorkerPool {
    pub stage: Arc<dyn Stage>,
    pub broker: Arc<dyn Broker>,
    pub input: String,
    /// Where stage outputs go; `None` for the last stage.
    pub output: Option<String>,
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl WorkerPool {
    /// Subscribes and starts the workers. They exit when `shutdown` flips to
    /// `true` (or its sender is dropped) or the subscription closes.
    pub async fn spawn(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> vigil_queue::Result<Vec<JoinHandle<()>>> {
        let subscription: Arc<dyn Subscription> =
            Arc::from(self.broker.subscribe(&self.input).await?);
        let pool = Arc::new(self);

        tracing::info!(
            stage = pool.stage.name(),
            topic = %pool.input,
            workers = pool.workers,
            "Worker pool started"
        );

        let handles = (0..pool.workers.max(1))
            .map(|worker| {
                let pool = pool.clone();
                let subscription = subscription.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run(worker, subscription, shutdown).await })
            })
            .collect();
        Ok(handles)
    }

    async fn run(
        &self,
        worker: usize,
        subscription: Arc<dyn Subscription>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = subscription.next() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            self.handle(delivery).await;
        }
        tracing::debug!(stage = self.stage.name(), worker, "Worker stopped");
    }

    /// Processes one delivery to completion: stage, publish outputs, settle.
    pub async fn handle(&self, delivery: Delivery) {
        let stage = self.stage.name();
        let outcome = match self.stage.process(&delivery.payload).await {
            Ok(outputs) => self.publish(outputs).await,
            Err(e) => Err(e),
        };

        let settled = match outcome {
            Ok(()) => delivery.ack().await,
            Err(e) => match e.disposition() {
                Disposition::Drop => {
                    tracing::warn!(stage, error = %e, "Dropping message");
                    delivery.ack().await
                }
                Disposition::RetryBounded if delivery.redeliveries >= self.retry.max_transient => {
                    self.dead_letter(delivery, &e).await
                }
                Disposition::RetryBounded | Disposition::Retry => {
                    let delay = self.retry.delay(delivery.redeliveries);
                    tracing::warn!(
                        stage,
                        error = %e,
                        redeliveries = delivery.redeliveries,
                        delay_ms = delay.as_millis() as u64,
                        "Redelivering message"
                    );
                    delivery.nack(delay).await
                }
            },
        };
        if let Err(e) = settled {
            tracing::error!(stage, error = %e, "Failed to settle delivery");
        }
    }

    async fn publish(&self, outputs: Vec<Vec<u8>>) -> Result<(), StageError> {
        let Some(topic) = &self.output else {
            return Ok(());
        };
        for payload in outputs {
            self.broker.publish(topic, payload).await?;
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: Delivery, cause: &StageError) -> vigil_queue::Result<()> {
        let topic = dead_letter_topic(&delivery.topic);
        tracing::error!(
            stage = self.stage.name(),
            error = %cause,
            redeliveries = delivery.redeliveries,
            dead_letter = %topic,
            "Redeliveries exhausted, dead-lettering message"
        );
        match self.broker.publish(&topic, delivery.payload.clone()).await {
            Ok(()) => delivery.ack().await,
            Err(e) => {
                tracing::error!(error = %e, "Dead-letter publish failed, redelivering");
                let delay = self.retry.max;
                delivery.nack(delay).await
            }
        }
    }
}
