/// Errors returned by cache backends.
///
/// Every variant is an infrastructure failure from the caller's point of
/// view; the pipeline redelivers the message that hit it.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The Redis server rejected the command or the connection failed.
    #[error("Cache: redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The configured backend could not be constructed.
    #[error("Cache: invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience `Result` alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
