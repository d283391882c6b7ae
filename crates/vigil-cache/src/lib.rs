//! Shared cache with an atomic set-if-absent primitive.
//!
//! The Alerter gates each notification on [`Cache::try_acquire`]: the first
//! caller for a key within its TTL wins, every other caller (another worker,
//! a redelivery, a duplicate publish) sees `false`. Correctness under
//! concurrency rests entirely on the backend performing the check-and-set as
//! one operation.

pub mod error;
pub mod memory;
pub mod redis_cache;


use std::time::Duration;

use async_trait::async_trait;

pub use error::{CacheError, Result};
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

#[async_trait]
pub trait Cache: Send + Sync {
    /// Sets `key` only if it is absent, with expiry `ttl`. Returns `true` if
    /// this call created the key.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Unconditionally sets `key` to `value` with expiry `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Returns the value of `key` if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Millisecond TTL for backends that take integers. Sub-millisecond TTLs round
/// up so a key is never set without expiry.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
