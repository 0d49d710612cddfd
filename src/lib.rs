// CSRFGuard - synchronizer-token CSRF protection for Rust HTTP stacks
//
// This crate re-exports the workspace members behind one import path.

// Re-export the engine at the top level
pub use csrfguard_engine::*;

// Re-export member crates
pub use csrfguard_config as config_loader;
pub use csrfguard_core as http;
pub use csrfguard_log as logging;
pub use csrfguard_store as store;

pub use csrfguard_config::{Settings, SettingsLoader};
pub use csrfguard_core::{Body, HeaderMap, HttpRequest, HttpResponse, Middleware, MiddlewareChain, StreamChunk};
pub use csrfguard_log::{AuditEvent, AuditOutcome, AuditSink, LogAuditSink, LogConfig, MemoryAuditSink, init_tracing};
pub use csrfguard_store::{MemoryTokenStore, StoreConfig, StoreError, StoreType};

#[cfg(feature = "redis")]
pub use csrfguard_store::RedisTokenStore;

/// Common imports for wiring the engine into an application.
pub mod prelude {
    pub use csrfguard_config::{Settings, SettingsLoader};
    pub use csrfguard_core::{HttpRequest, HttpResponse, Middleware, MiddlewareChain, handler_fn};
    pub use csrfguard_engine::prelude::*;
    pub use csrfguard_log::{AuditSink, LogAuditSink};
    pub use csrfguard_store::{MemoryTokenStore, TokenStore};
}
