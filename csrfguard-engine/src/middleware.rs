use crate::engine::{CsrfEngine, Gate};
use async_trait::async_trait;
use csrfguard_core::{Error, HttpRequest, HttpResponse, Middleware, Next};
use std::sync::Arc;

/// CSRF protection middleware
#[derive(Debug, Clone)]
pub struct CsrfMiddleware {
    engine: Arc<CsrfEngine>,
}

impl CsrfMiddleware {
    pub fn new(engine: CsrfEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn from_shared(engine: Arc<CsrfEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<CsrfEngine> {
        &self.engine
    }
}

#[async_trait]
impl Middleware for CsrfMiddleware {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let ctx = match self.engine.before_request(&mut req).await {
            Gate::Proceed(ctx) => ctx,
            Gate::Respond(resp) => return Ok(resp),
        };
        let resp = next(req).await?;
        Ok(self.engine.after_response(&ctx, resp).await)
    }
}
