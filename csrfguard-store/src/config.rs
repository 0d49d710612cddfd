//! Store configuration

use crate::error::{StoreError, StoreResult};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default lifetime of an issued token.
pub const DEFAULT_EXPIRY_WINDOW: Duration = Duration::from_secs(1800);

/// Default deadline for a single store call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreType {
    /// Process-local map; every worker must share one engine instance.
    #[default]
    Memory,
    /// Shared Redis instance; safe across processes and hosts.
    Redis,
}

impl FromStr for StoreType {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreType::Memory),
            "redis" => Ok(StoreType::Redis),
            other => Err(StoreError::backend(format!("unknown store backend '{other}'"))),
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreType::Memory => "memory",
            StoreType::Redis => "redis",
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreType,
    /// Connection URL, used by networked backends
    pub url: String,
    /// Key namespace, so several deployments can share one Redis
    pub namespace: String,
    pub expiry_window: Duration,
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreType::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            namespace: "csrfguard".to_string(),
            expiry_window: DEFAULT_EXPIRY_WINDOW,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: StoreType::Redis,
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_expiry_window(mut self, window: Duration) -> Self {
        self.expiry_window = window;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
