//! Request/response model for csrfguard.
//!
//! This crate is deliberately small: just enough HTTP to let the
//! protection engine inspect requests, short-circuit them, and rewrite
//! responses whose bodies may arrive as a stream of chunks.

pub mod body;
pub mod error;
pub mod headers;
pub mod http;
pub mod middleware;
pub mod streaming;

pub use body::Body;
pub use error::{Error, Result};
pub use headers::{Header, HeaderMap};
pub use http::{HttpRequest, HttpResponse};
pub use middleware::{BoxFuture, HandlerFn, Middleware, MiddlewareChain, Next, handler_fn};
pub use streaming::{BodyStream, ChunkSender, ChunkStream, StreamChunk};
