//! Short-lived named locks with expiry.
//!
//! Used so that a periodic sweep never overlaps with itself for one tenant,
//! even across processes sharing the store. A crashed holder's lock expires.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use pipeline_core::Result;

#[async_trait]
pub trait SweepLock: Send + Sync {
    /// Take `name` for `ttl` unless someone else holds an unexpired lock.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool>;

    /// Release `name` if `holder` still owns it.
    async fn release(&self, name: &str, holder: &str) -> Result<()>;

    /// Drop expired locks. Returns the count.
    async fn expire(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[derive(Debug, Clone)]
struct Held {
    holder: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemorySweepLock {
    locks: Mutex<HashMap<String, Held>>,
}

impl InMemorySweepLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SweepLock for InMemorySweepLock {
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool> {
        let mut locks = self.locks.lock();
        match locks.get(name) {
            Some(held) if held.expires_at > now && held.holder != holder => Ok(false),
            _ => {
                locks.insert(
                    name.to_string(),
                    Held {
                        holder: holder.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn release(&self, name: &str, holder: &str) -> Result<()> {
        let mut locks = self.locks.lock();
        if locks.get(name).is_some_and(|held| held.holder == holder) {
            locks.remove(name);
        }
        Ok(())
    }

    async fn expire(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, held| held.expires_at > now);
        Ok(before - locks.len())
    }
}
