// Middleware plumbing around an origin handler

use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

pub type BoxFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

/// The rest of the chain, handed to each middleware.
pub type Next = Box<dyn FnOnce(HttpRequest) -> BoxFuture + Send>;

/// The origin handler at the end of the chain.
pub type HandlerFn = Arc<dyn Fn(HttpRequest) -> BoxFuture + Send + Sync>;

/// Wrap an async closure as a [`HandlerFn`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request, optionally delegating to `next`.
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

/// Ordered list of middleware applied outermost first.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.push(Arc::new(middleware));
        self
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        let mut list = (*self.middlewares).clone();
        list.push(middleware);
        self.middlewares = Arc::new(list);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            method = %req.method,
            path = %req.path,
            "running middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    fn execute_from(&self, index: usize, req: HttpRequest, handler: HandlerFn) -> BoxFuture {
        match self.middlewares.get(index) {
            None => {
                trace!("middleware chain complete, calling handler");
                handler(req)
            }
            Some(middleware) => {
                let middleware = middleware.clone();
                let chain = self.clone();
                trace!(middleware_index = index, "entering middleware");
                Box::pin(async move {
                    middleware
                        .handle(
                            req,
                            Box::new(move |req| chain.execute_from(index + 1, req, handler)),
                        )
                        .await
                })
            }
        }
    }
}
