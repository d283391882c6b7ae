//! Message broker abstraction with at-least-once, competing-consumer
//! semantics.
//!
//! A [`Subscription`] may be shared by any number of workers; each
//! [`Delivery`] goes to exactly one of them and stays outstanding until it is
//! acked or nacked. A nacked delivery is redelivered after the given delay
//! with its redelivery counter incremented.

pub mod error;
pub mod memory;


use std::time::Duration;

use async_trait::async_trait;

pub use error::{QueueError, Result};
pub use memory::MemoryBroker;

/// Topic that receives messages which exhausted their redeliveries on `topic`.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}.dead")
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Opens a subscription on `topic`. Subscriptions to the same topic
    /// compete for messages rather than each receiving a copy.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>>;
}

#[async_trait]
pub trait Subscription: Send + Sync {
    /// Waits for the next delivery. Returns `None` once the topic is closed.
    async fn next(&self) -> Option<Delivery>;
}

/// Settles a single delivery with the broker that produced it.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(self: Box<Self>) -> Result<()>;
    async fn nack(self: Box<Self>, delay: Duration) -> Result<()>;
}

/// One message handed to one consumer.
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
    /// How many times this message was nacked before this delivery.
    pub redeliveries: u32,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(
        topic: impl Into<String>,
        payload: Vec<u8>,
        redeliveries: u32,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
            redeliveries,
            acker,
        }
    }

    /// Marks the message as done; it will not be delivered again.
    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    /// Returns the message to the broker for redelivery after `delay`.
    pub async fn nack(self, delay: Duration) -> Result<()> {
        self.acker.nack(delay).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("topic", &self.topic)
            .field("len", &self.payload.len())
            .field("redeliveries", &self.redeliveries)
            .finish()
    }
}
