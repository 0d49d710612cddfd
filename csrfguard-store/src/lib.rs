//! Token storage for csrfguard.
//!
//! A [`TokenStore`] maps a session id to its single active token and the
//! time it was issued, and keeps the global counter that decides when the
//! token generator is reseeded. Nothing here knows about HTTP.
//!
//! ```rust
//! use csrfguard_store::{MatchResult, MemoryTokenStore, TokenStore};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryTokenStore::new();
//! let now = chrono::Utc::now();
//! store.put("session-1", "k3J9aQ0zLmP2xYw", now).await.unwrap();
//!
//! let result = store.matches("session-1", "k3J9aQ0zLmP2xYw", now).await.unwrap();
//! assert_eq!(result, MatchResult::Valid);
//! # });
//! ```

pub mod config;
pub mod error;
pub mod record;
pub mod stores;

pub use config::{DEFAULT_EXPIRY_WINDOW, DEFAULT_TIMEOUT, StoreConfig, StoreType};
pub use error::{StoreError, StoreResult};
pub use record::{CounterTick, MatchResult, TokenRecord};
#[cfg(feature = "redis")]
pub use stores::RedisTokenStore;
pub use stores::{MemoryTokenStore, TimeoutStore, TokenStore};

use std::sync::Arc;
use tracing::info;

/// Build the configured backend.
///
/// The backend is returned bare; callers bound it with a [`TimeoutStore`].
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn TokenStore>> {
    let inner: Arc<dyn TokenStore> = match config.backend {
        StoreType::Memory => Arc::new(MemoryTokenStore::with_expiry_window(config.expiry_window)),
        #[cfg(feature = "redis")]
        StoreType::Redis => Arc::new(RedisTokenStore::connect(config).await?),
        #[cfg(not(feature = "redis"))]
        StoreType::Redis => {
            return Err(StoreError::backend(
                "redis backend requested but the `redis` feature is disabled",
            ));
        }
    };

    info!(
        backend = inner.store_type(),
        expiry_secs = config.expiry_window.as_secs(),
        timeout_ms = config.timeout.as_millis() as u64,
        "token store ready"
    );
    Ok(inner)
}

pub mod prelude {
    pub use crate::config::{StoreConfig, StoreType};
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::record::{CounterTick, MatchResult, TokenRecord};
    pub use crate::stores::{MemoryTokenStore, TimeoutStore, TokenStore};
}
