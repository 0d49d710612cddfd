//! Token storage backends
//!
//! - **Memory**: DashMap plus an atomic counter, for single-process deployments
//! - **Redis**: shared storage for multi-process deployments
//! - **Timeout**: decorator that bounds every call of another store

mod memory;
#[cfg(feature = "redis")]
mod redis;
mod timeout;

pub use memory::MemoryTokenStore;
#[cfg(feature = "redis")]
pub use redis::RedisTokenStore;
pub use timeout::TimeoutStore;

use crate::error::StoreResult;
use crate::record::{CounterTick, MatchResult, TokenRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Durable mapping from session id to its current token.
///
/// Implementations must be safe under concurrent use from many workers:
/// `put` is an atomic upsert and `bump_counter` an atomic
/// increment-compare-reset.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current record for a session, exact match only.
    async fn get(&self, session_id: &str) -> StoreResult<Option<TokenRecord>>;

    /// Insert or replace the session's token. Safe to retry.
    async fn put(&self, session_id: &str, token: &str, now: DateTime<Utc>) -> StoreResult<()>;

    /// Compare a presented token with the stored one.
    ///
    /// Expired rows report `Expired` even if the sweep has not removed
    /// them yet.
    async fn matches(
        &self,
        session_id: &str,
        presented: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<MatchResult> {
        Ok(match self.get(session_id).await? {
            Some(record) => record.check(presented, now, self.expiry_window()),
            None => MatchResult::NotFound,
        })
    }

    /// Delete every record older than the expiry window. Returns the
    /// number of rows removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Increment the reseed counter, resetting it to zero in the same
    /// atomic step when it reaches `threshold`.
    async fn bump_counter(&self, threshold: u64) -> StoreResult<CounterTick>;

    /// Current counter value.
    async fn counter(&self) -> StoreResult<u64>;

    fn expiry_window(&self) -> Duration;

    /// Backend name for logs.
    fn store_type(&self) -> &'static str;
}
