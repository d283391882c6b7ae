use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{Cache, Result};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache for single-node deployments and tests.
///
/// Only atomic within one process: two servers sharing a database must use
/// [`crate::RedisCache`] instead.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drops expired entries. Expired keys are already invisible to readers;
    /// this only reclaims memory.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries();
        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: "1".to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }
}
