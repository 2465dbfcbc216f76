//! Shared memory store.
//!
//! Short-lived keys shared between instances: manual verification codes,
//! rate limit counters, mutation locks and pub/sub pings.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use seventv_common::AppResult;
use tokio::time::Instant;

/// Shared key/value store with expiry.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Read `key`.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Delete `key`.
    async fn del(&self, key: &str) -> AppResult<()>;

    /// Publish `message` on a pub/sub channel.
    async fn publish(&self, channel: &str, message: &str) -> AppResult<()>;

    /// Increment the counter `key` by `by`, starting a window of `window` if it
    /// does not exist. Returns the new count and the seconds until reset.
    async fn hit(&self, key: &str, by: i64, window: Duration) -> AppResult<(i64, i64)>;

    /// Set `key` only if it does not exist. Returns whether the lock was taken.
    async fn try_lock(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> AppResult<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local store for development and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    published: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(channel, message)` published so far.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn live(&self, key: &str, now: Instant) -> Option<Entry> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(e) if e.expires_at > now => Some(e.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.live(key, Instant::now()).map(|e| e.value))
    }

    async fn del(&self, key: &str) -> AppResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> AppResult<()> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel.to_string(), message.to_string()));
        Ok(())
    }

    async fn hit(&self, key: &str, by: i64, window: Duration) -> AppResult<(i64, i64)> {
        let now = Instant::now();
        let current = self.live(key, now);

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = match current {
            Some(mut e) => {
                let count = e.value.parse::<i64>().unwrap_or(0) + by;
                e.value = count.to_string();
                e
            }
            None => Entry {
                value: by.to_string(),
                expires_at: now + window,
            },
        };
        let count = entry.value.parse::<i64>().unwrap_or(by);
        let ttl = i64::try_from(entry.expires_at.saturating_duration_since(now).as_secs())
            .unwrap_or(i64::MAX);
        entries.insert(key.to_string(), entry);

        Ok((count, ttl))
    }

    async fn try_lock(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        if self.live(key, Instant::now()).is_some() {
            return Ok(false);
        }
        self.set_ex(key, "1", ttl).await?;
        Ok(true)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
