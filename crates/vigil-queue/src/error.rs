/// Errors returned by broker backends.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The topic's channel has been closed, typically during shutdown.
    #[error("Queue: topic '{0}' is closed")]
    Closed(String),

    /// Backend-specific failure not covered by other variants.
    #[error("Queue: {0}")]
    Other(String),
}

/// Convenience `Result` alias for broker operations.
pub type Result<T> = std::result::Result<T, QueueError>;
