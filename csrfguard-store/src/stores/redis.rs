//! Redis token store
//!
//! Layout under the namespace `ns`:
//!
//! - `ns:token:<session>`: hash with `token` and `issued_at` (unix seconds)
//! - `ns:issued`: sorted set of session ids scored by `issued_at`
//! - `ns:reseed_counter`: integer
//!
//! Upsert, sweep and counter bump are Lua scripts, so each runs as one
//! atomic step no matter how many workers share the instance.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::record::{CounterTick, TokenRecord};
use crate::stores::TokenStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, trace};

const UPSERT_SCRIPT: &str = r#"
redis.call('HSET', KEYS[1], 'token', ARGV[1], 'issued_at', ARGV[2])
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[4]))
redis.call('ZADD', KEYS[2], tonumber(ARGV[2]), ARGV[3])
return 1
"#;

const SWEEP_SCRIPT: &str = r#"
local cutoff = '(' .. ARGV[1]
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', cutoff)
for _, id in ipairs(ids) do
    redis.call('DEL', ARGV[2] .. id)
end
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', cutoff)
return #ids
"#;

const COUNTER_SCRIPT: &str = r#"
local value = redis.call('INCR', KEYS[1])
if value >= tonumber(ARGV[1]) then
    redis.call('SET', KEYS[1], 0)
    return {value, 1}
end
return {value, 0}
"#;

pub struct RedisTokenStore {
    conn: ConnectionManager,
    namespace: String,
    expiry_window: Duration,
    upsert: redis::Script,
    sweep: redis::Script,
    counter: redis::Script,
}

impl RedisTokenStore {
    /// Connect using the URL, namespace and expiry window of `config`.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        debug!(url = %config.url, namespace = %config.namespace, "connecting token store to Redis");

        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        Ok(Self {
            conn,
            namespace: config.namespace.clone(),
            expiry_window: config.expiry_window,
            upsert: redis::Script::new(UPSERT_SCRIPT),
            sweep: redis::Script::new(SWEEP_SCRIPT),
            counter: redis::Script::new(COUNTER_SCRIPT),
        })
    }

    fn token_prefix(&self) -> String {
        format!("{}:token:", self.namespace)
    }

    fn token_key(&self, session_id: &str) -> String {
        format!("{}{}", self.token_prefix(), session_id)
    }

    fn index_key(&self) -> String {
        format!("{}:issued", self.namespace)
    }

    fn counter_key(&self) -> String {
        format!("{}:reseed_counter", self.namespace)
    }

    fn window_secs(&self) -> i64 {
        i64::try_from(self.expiry_window.as_secs()).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get(&self, session_id: &str) -> StoreResult<Option<TokenRecord>> {
        let mut conn = self.conn.clone();
        let (token, issued_at): (Option<String>, Option<i64>) = redis::cmd("HMGET")
            .arg(self.token_key(session_id))
            .arg("token")
            .arg("issued_at")
            .query_async(&mut conn)
            .await?;

        match (token, issued_at) {
            (Some(token), Some(secs)) => {
                let issued_at = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                    StoreError::invalid_record(format!("issued_at {secs} out of range"))
                })?;
                Ok(Some(TokenRecord::new(session_id, token, issued_at)))
            }
            (None, None) => Ok(None),
            _ => Err(StoreError::invalid_record(format!(
                "partial token row for session {session_id}"
            ))),
        }
    }

    async fn put(&self, session_id: &str, token: &str, now: DateTime<Utc>) -> StoreResult<()> {
        trace!(session = %session_id, "storing token in Redis");

        // Rows outlive the window a little so validation can still report
        // Expired; the sweep and this TTL remove them afterwards.
        let ttl = self.window_secs().saturating_mul(2).max(1);

        let mut conn = self.conn.clone();
        let _: i64 = self
            .upsert
            .key(self.token_key(session_id))
            .key(self.index_key())
            .arg(token)
            .arg(now.timestamp())
            .arg(session_id)
            .arg(ttl)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        // issued_at + window < now  <=>  issued_at < now - window
        let cutoff = now.timestamp().saturating_sub(self.window_secs());

        let mut conn = self.conn.clone();
        let removed: i64 = self
            .sweep
            .key(self.index_key())
            .arg(cutoff)
            .arg(self.token_prefix())
            .invoke_async(&mut conn)
            .await?;

        if removed > 0 {
            debug!(removed, "swept expired tokens from Redis");
        }
        Ok(removed.max(0) as u64)
    }

    async fn bump_counter(&self, threshold: u64) -> StoreResult<CounterTick> {
        let mut conn = self.conn.clone();
        let (value, reset): (i64, i64) = self
            .counter
            .key(self.counter_key())
            .arg(threshold.max(1))
            .invoke_async(&mut conn)
            .await?;

        Ok(CounterTick {
            value: value.max(0) as u64,
            reseed: reset == 1,
        })
    }

    async fn counter(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET")
            .arg(self.counter_key())
            .query_async(&mut conn)
            .await?;
        Ok(value.unwrap_or(0).max(0) as u64)
    }

    fn expiry_window(&self) -> Duration {
        self.expiry_window
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MatchResult;

    async fn store() -> RedisTokenStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let namespace = format!("csrfguard-test-{}", std::process::id());
        RedisTokenStore::connect(&StoreConfig::redis(url).with_namespace(namespace))
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_upsert_and_match() {
        let store = store().await;
        let now = Utc::now();

        store.put("s1", "first", now).await.unwrap();
        store.put("s1", "second", now).await.unwrap();

        assert_eq!(store.matches("s1", "second", now).await.unwrap(), MatchResult::Valid);
        assert_eq!(store.matches("s1", "first", now).await.unwrap(), MatchResult::NotFound);
        assert_eq!(store.matches("nobody", "x", now).await.unwrap(), MatchResult::NotFound);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_sweep_and_counter() {
        let store = store().await;
        let now = Utc::now();
        let old = now - chrono::Duration::seconds(4000);

        store.put("stale", "a", old).await.unwrap();
        store.put("fresh", "b", now).await.unwrap();
        assert_eq!(store.sweep_expired(now).await.unwrap(), 1);
        assert!(store.get("stale").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());

        for _ in 0..2 {
            assert!(!store.bump_counter(3).await.unwrap().reseed);
        }
        let tick = store.bump_counter(3).await.unwrap();
        assert_eq!(tick, CounterTick { value: 3, reseed: true });
        assert_eq!(store.counter().await.unwrap(), 0);
    }
}
