use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{dead_letter_topic, Acker, Broker, Delivery, QueueError, Result, Subscription};

struct Envelope {
    payload: Vec<u8>,
    redeliveries: u32,
}

/// Per-topic channel. `pending` counts messages queued or in flight
/// (delivered but not yet acked).
struct Topic {
    name: String,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    pending: AtomicUsize,
    subscribed: AtomicBool,
}

impl Topic {
    fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
            pending: AtomicUsize::new(0),
            subscribed: AtomicBool::new(false),
        }
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(envelope).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            QueueError::Closed(self.name.clone())
        })
    }
}

/// In-process broker backed by unbounded tokio channels.
///
/// Messages do not survive a restart. Intended for single-node deployments
/// and for driving the pipeline end to end in tests.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<Mutex<HashMap<String, Arc<Topic>>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> Arc<Topic> {
        let mut topics = self
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Topic::new(name)))
            .clone()
    }

    /// Number of messages queued or in flight on `topic`.
    pub fn depth(&self, topic: &str) -> usize {
        self.topic(topic).pending.load(Ordering::SeqCst)
    }

    /// Removes and returns every message currently queued on a topic nobody
    /// consumes, such as a dead-letter topic or the output of the last stage
    /// under test.
    pub async fn take_queued(&self, topic: &str) -> Vec<Vec<u8>> {
        let topic = self.topic(topic);
        let mut rx = topic.rx.lock().await;
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            topic.pending.fetch_sub(1, Ordering::SeqCst);
            out.push(envelope.payload);
        }
        out
    }

    /// Empties the dead-letter topic of each of `topics` and returns how
    /// many messages were discarded. Dead letters have no consumer here, so
    /// without a periodic sweep they are held for the life of the process.
    pub async fn sweep_dead_letters(&self, topics: &[&str]) -> usize {
        let mut total = 0;
        for topic in topics {
            let dead = dead_letter_topic(topic);
            let discarded = self.take_queued(&dead).await.len();
            if discarded > 0 {
                tracing::warn!(topic = %dead, discarded, "Discarded dead-lettered messages");
            }
            total += discarded;
        }
        total
    }

    /// Waits until every subscribed topic has no queued or in-flight
    /// messages. Returns `false` if `timeout` elapses first.
    ///
    /// Stages publish their outputs before acking their input, so an idle
    /// broker means the pipeline has fully drained.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn is_idle(&self) -> bool {
        let topics = self
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        topics
            .values()
            .filter(|t| t.subscribed.load(Ordering::SeqCst))
            .all(|t| t.pending.load(Ordering::SeqCst) == 0)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.topic(topic).send(Envelope {
            payload,
            redeliveries: 0,
        })
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let topic = self.topic(topic);
        topic.subscribed.store(true, Ordering::SeqCst);
        Ok(Box::new(MemorySubscription { topic }))
    }
}

struct MemorySubscription {
    topic: Arc<Topic>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&self) -> Option<Delivery> {
        let envelope = self.topic.rx.lock().await.recv().await?;
        Some(Delivery::new(
            self.topic.name.clone(),
            envelope.payload.clone(),
            envelope.redeliveries,
            Box::new(MemoryAcker {
                topic: self.topic.clone(),
                envelope,
            }),
        ))
    }
}

struct MemoryAcker {
    topic: Arc<Topic>,
    envelope: Envelope,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.topic.pending.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(self: Box<Self>, delay: Duration) -> Result<()> {
        let MemoryAcker { topic, envelope } = *self;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let redelivered = Envelope {
                payload: envelope.payload,
                redeliveries: envelope.redeliveries.saturating_add(1),
            };
            // The in-flight slot carries over to the redelivered copy.
            if topic.tx.send(redelivered).is_err() {
                topic.pending.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!(topic = %topic.name, "Dropped nacked message, topic closed");
            }
        });
        Ok(())
    }
}
