//! In-memory token store
//!
//! DashMap gives per-shard locking, so concurrent upserts for different
//! sessions do not contend. The reseed counter is a single `AtomicU64`.

use crate::config::DEFAULT_EXPIRY_WINDOW;
use crate::error::StoreResult;
use crate::record::{CounterTick, TokenRecord};
use crate::stores::TokenStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

pub struct MemoryTokenStore {
    records: DashMap<String, TokenRecord>,
    counter: AtomicU64,
    expiry_window: Duration,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_expiry_window(DEFAULT_EXPIRY_WINDOW)
    }

    pub fn with_expiry_window(expiry_window: Duration) -> Self {
        debug!(expiry_secs = expiry_window.as_secs(), "creating in-memory token store");
        Self {
            records: DashMap::new(),
            counter: AtomicU64::new(0),
            expiry_window,
        }
    }

    /// Number of sessions with a stored token.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, session_id: &str) -> StoreResult<Option<TokenRecord>> {
        Ok(self.records.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, session_id: &str, token: &str, now: DateTime<Utc>) -> StoreResult<()> {
        trace!(session = %session_id, "storing token");
        self.records.insert(
            session_id.to_string(),
            TokenRecord::new(session_id, token, now),
        );
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let window = self.expiry_window;
        let mut removed = 0u64;
        self.records.retain(|_, record| {
            let keep = !record.is_expired(now, window);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed, "swept expired tokens");
        }
        Ok(removed)
    }

    async fn bump_counter(&self, threshold: u64) -> StoreResult<CounterTick> {
        let threshold = threshold.max(1);
        let step = |v: u64| Some(if v + 1 >= threshold { 0 } else { v + 1 });
        let previous = match self.counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, step) {
            Ok(v) | Err(v) => v,
        };
        let value = previous + 1;
        Ok(CounterTick {
            value,
            reseed: value >= threshold,
        })
    }

    async fn counter(&self) -> StoreResult<u64> {
        Ok(self.counter.load(Ordering::Acquire))
    }

    fn expiry_window(&self) -> Duration {
        self.expiry_window
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
