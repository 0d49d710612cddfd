//! Deadline decorator for any token store

use crate::error::{StoreError, StoreResult};
use crate::record::{CounterTick, MatchResult, TokenRecord};
use crate::stores::TokenStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Bounds every call of the wrapped store with `tokio::time::timeout`.
///
/// A call that misses the deadline is abandoned and reported as
/// [`StoreError::Timeout`].
pub struct TimeoutStore {
    inner: Arc<dyn TokenStore>,
    timeout: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn TokenStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        T: Send,
        F: Future<Output = StoreResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op,
                    backend = self.inner.store_type(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "token store call timed out"
                );
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl TokenStore for TimeoutStore {
    async fn get(&self, session_id: &str) -> StoreResult<Option<TokenRecord>> {
        self.bounded("get", self.inner.get(session_id)).await
    }

    async fn put(&self, session_id: &str, token: &str, now: DateTime<Utc>) -> StoreResult<()> {
        self.bounded("put", self.inner.put(session_id, token, now)).await
    }

    async fn matches(
        &self,
        session_id: &str,
        presented: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<MatchResult> {
        self.bounded("matches", self.inner.matches(session_id, presented, now))
            .await
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.bounded("sweep_expired", self.inner.sweep_expired(now)).await
    }

    async fn bump_counter(&self, threshold: u64) -> StoreResult<CounterTick> {
        self.bounded("bump_counter", self.inner.bump_counter(threshold))
            .await
    }

    async fn counter(&self) -> StoreResult<u64> {
        self.bounded("counter", self.inner.counter()).await
    }

    fn expiry_window(&self) -> Duration {
        self.inner.expiry_window()
    }

    fn store_type(&self) -> &'static str {
        self.inner.store_type()
    }
}
