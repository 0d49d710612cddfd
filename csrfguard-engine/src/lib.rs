//! # CSRFGuard Engine
//!
//! Synchronizer-token CSRF protection that sits in front of an origin
//! handler.
//!
//! ## Features
//!
//! - ✅ **Per-session tokens** - Random alphanumeric tokens kept in a [`TokenStore`]
//! - ✅ **Expiry** - Tokens stop validating after the configured window
//! - ✅ **Reseeding** - The generator is reseeded from the OS every N tokens
//! - ✅ **GET rules** - Opt specific URLs into validation for safe methods
//! - ✅ **Failure actions** - Forbidden, strip, redirect, message or 500
//! - ✅ **Streaming rewrite** - Injects the client script into HTML bodies
//!   chunk by chunk, without buffering the response
//! - ✅ **Audit trail** - Every rejected request is recorded before the
//!   action runs
//!
//! ## Quick Start
//!
//! ```rust
//! use csrfguard_engine::{CsrfConfig, CsrfEngine, Gate};
//! use csrfguard_core::{HttpRequest, HttpResponse};
//! use csrfguard_store::MemoryTokenStore;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = CsrfConfig::builder()
//!     .verify_get(r"^https?://bank\.example/delete")
//!     .build()
//!     .unwrap();
//! let engine = CsrfEngine::new(config, Arc::new(MemoryTokenStore::new()));
//!
//! let mut req = HttpRequest::get("/").with_header("Host", "bank.example");
//! let Gate::Proceed(ctx) = engine.before_request(&mut req).await else {
//!     unreachable!("plain GET requests are exempt");
//! };
//!
//! let resp = engine
//!     .after_response(&ctx, HttpResponse::html("<html><body>hi</body></html>"))
//!     .await;
//! assert_eq!(resp.headers.get_all("Set-Cookie").len(), 2);
//! # });
//! ```
//!
//! ## Usage as middleware
//!
//! ```rust
//! use csrfguard_engine::{CsrfConfig, CsrfEngine, CsrfMiddleware};
//! use csrfguard_core::{HttpRequest, HttpResponse, MiddlewareChain, handler_fn};
//! use csrfguard_store::MemoryTokenStore;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let engine = CsrfEngine::new(
//!     CsrfConfig::builder().build().unwrap(),
//!     Arc::new(MemoryTokenStore::new()),
//! );
//! let chain = MiddlewareChain::new().with(CsrfMiddleware::new(engine));
//! let handler = handler_fn(|_req| async { Ok(HttpResponse::ok()) });
//!
//! // No session, no token: rejected before the handler runs.
//! let resp = chain.apply(HttpRequest::post("/transfer"), handler).await.unwrap();
//! assert_eq!(resp.status, 403);
//! # });
//! ```

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod middleware;
pub mod rewriter;
pub mod token;
pub mod validator;

pub use action::{ActionOutcome, FailureAction};
pub use config::{CsrfConfig, CsrfConfigBuilder, GetRule, PROTECTED_BY, SameSite};
pub use engine::{CsrfEngine, Gate, ProtectionContext};
pub use error::{CsrfError, Result};
pub use fragment::Fragments;
pub use middleware::CsrfMiddleware;
pub use rewriter::{ResponseRewriter, RewriteState, RewriteStream};
pub use token::{MAX_SESSION_ID_LENGTH, SESSION_ID_LENGTH, TokenGenerator};
pub use validator::{
    FailureReason, IGNORE_MARKER, REGENERATE_MARKER, RequestValidator, VALIDATED_MARKER, Validation, Verdict,
};

pub use csrfguard_store::TokenStore;

pub mod prelude {
    pub use crate::action::FailureAction;
    pub use crate::config::{CsrfConfig, SameSite};
    pub use crate::engine::{CsrfEngine, Gate, ProtectionContext};
    pub use crate::error::{CsrfError, Result};
    pub use crate::middleware::CsrfMiddleware;
    pub use crate::rewriter::{ResponseRewriter, RewriteStream};
    pub use crate::validator::{FailureReason, Verdict};
}
