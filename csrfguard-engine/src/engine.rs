//! Request/response coordinator.

use crate::action::ActionOutcome;
use crate::config::{CsrfConfig, PROTECTED_BY};
use crate::error::Result;
use crate::fragment::Fragments;
use crate::rewriter::{ResponseRewriter, RewriteStream};
use crate::token::{MAX_SESSION_ID_LENGTH, TokenGenerator};
use crate::validator::{RequestValidator, Verdict};
use bytes::Bytes;
use chrono::Utc;
use csrfguard_config::{MIN_TOKEN_LENGTH, Settings};
use csrfguard_core::{Body, HttpRequest, HttpResponse};
use csrfguard_log::{AuditEvent, AuditSink, LogAuditSink};
use csrfguard_store::{TimeoutStore, TokenStore};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the request stage learned, handed to the response stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionContext {
    /// Engine switched off; the response is left alone.
    pub disabled: bool,
    /// Static asset; the response is left alone.
    pub ignored: bool,
    /// Passed or exempt from validation.
    pub validated: bool,
    /// Issue a fresh token with the response.
    pub regenerate: bool,
    pub session_id: Option<String>,
    pub method: String,
}

/// Outcome of the request stage.
#[derive(Debug)]
pub enum Gate {
    /// Run the origin handler, then pass its response to
    /// [`CsrfEngine::after_response`].
    Proceed(ProtectionContext),
    /// Validation failed; send this response instead.
    Respond(HttpResponse),
}

/// Ties the validator, generator, store and rewriter together.
pub struct CsrfEngine {
    config: Arc<CsrfConfig>,
    store: Arc<dyn TokenStore>,
    generator: Arc<TokenGenerator>,
    validator: RequestValidator,
    fragments: Arc<Fragments>,
    audit: Arc<dyn AuditSink>,
}

impl CsrfEngine {
    /// Build an engine over `store`. Every store call is bounded by the
    /// configured store timeout.
    pub fn new(config: CsrfConfig, store: Arc<dyn TokenStore>) -> Self {
        let store: Arc<dyn TokenStore> = Arc::new(TimeoutStore::new(store, config.store.timeout));
        let config = Arc::new(config);
        let fragments = Arc::new(Fragments::render(&config));
        Self {
            validator: RequestValidator::new(Arc::clone(&config), Arc::clone(&store)),
            generator: Arc::new(TokenGenerator::new(MIN_TOKEN_LENGTH)),
            audit: Arc::new(LogAuditSink),
            config,
            store,
            fragments,
        }
    }

    /// Connect the configured store and build the engine.
    pub async fn connect(config: CsrfConfig) -> Result<Self> {
        let store = csrfguard_store::connect(&config.store).await?;
        info!(
            action = config.action.name(),
            token_name = %config.token_name,
            get_rules = config.verify_get_for.len(),
            "csrf engine ready"
        );
        Ok(Self::new(config, store))
    }

    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        Self::connect(CsrfConfig::from_settings(settings)?).await
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn with_generator(mut self, generator: TokenGenerator) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    /// Replace the fragments rendered from the configuration.
    pub fn with_fragments(mut self, fragments: Fragments) -> Self {
        self.fragments = Arc::new(fragments);
        self
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn generator(&self) -> &TokenGenerator {
        &self.generator
    }

    pub fn fragments(&self) -> &Arc<Fragments> {
        &self.fragments
    }

    pub fn validator(&self) -> &RequestValidator {
        &self.validator
    }

    /// Validate a request before the origin handler runs.
    pub async fn before_request(&self, req: &mut HttpRequest) -> Gate {
        let mut ctx = ProtectionContext {
            method: req.method.clone(),
            ..ProtectionContext::default()
        };
        if !self.config.enabled {
            ctx.disabled = true;
            return Gate::Proceed(ctx);
        }

        let validation = self.validator.validate(req, Utc::now()).await;
        ctx.session_id = validation.session_id;

        match validation.verdict {
            Verdict::Ignored => {
                ctx.ignored = true;
                Gate::Proceed(ctx)
            }
            Verdict::Exempt | Verdict::Passed => {
                ctx.validated = true;
                ctx.regenerate = true;
                Gate::Proceed(ctx)
            }
            Verdict::Failed(reason) => {
                let action = &self.config.action;
                let mut event = AuditEvent::new(
                    action.audit_outcome(),
                    action.name(),
                    reason.as_str(),
                    req.method.as_str(),
                    self.validator.audit_url(req),
                );
                if let Some(id) = &ctx.session_id {
                    event = event.with_session_id(id.as_str());
                }
                if let Some(addr) = &req.remote_addr {
                    event = event.with_remote_addr(addr.as_str());
                }
                self.audit.record(&event);

                match action.apply(req) {
                    ActionOutcome::Respond(resp) => Gate::Respond(resp),
                    ActionOutcome::Continue => Gate::Proceed(ctx),
                }
            }
        }
    }

    /// Rewrite the response and attach a fresh token when one is due.
    pub async fn after_response(&self, ctx: &ProtectionContext, mut resp: HttpResponse) -> HttpResponse {
        if ctx.disabled || ctx.ignored {
            return resp;
        }
        if ctx.validated {
            resp.headers.insert("X-Protected-By", PROTECTED_BY);
        }

        self.rewrite(ctx, &mut resp);

        if ctx.regenerate {
            self.regenerate(ctx, &mut resp).await;
        }
        resp
    }

    fn rewrite(&self, ctx: &ProtectionContext, resp: &mut HttpResponse) {
        let mut rewriter = ResponseRewriter::new(Arc::clone(&self.fragments));
        if !rewriter.begin(&mut resp.headers, resp.status, &ctx.method) {
            return;
        }

        let body = match std::mem::take(&mut resp.body) {
            Body::Stream(stream) => Body::from_stream(RewriteStream::new(stream, rewriter)),
            Body::Full(bytes) => self.rewrite_buffered(&mut rewriter, resp, bytes),
            Body::Empty => self.rewrite_buffered(&mut rewriter, resp, Bytes::new()),
        };
        resp.body = body;
    }

    fn rewrite_buffered(&self, rewriter: &mut ResponseRewriter, resp: &mut HttpResponse, bytes: Bytes) -> Body {
        let out = rewriter.rewrite_full(bytes);
        resp.headers.set_content_length(out.len() as u64);
        if out.is_empty() { Body::Empty } else { Body::Full(out) }
    }

    async fn regenerate(&self, ctx: &ProtectionContext, resp: &mut HttpResponse) {
        let session_id = match ctx.session_id.as_deref().filter(|id| is_valid_session_id(id)) {
            Some(id) => id.to_string(),
            None => self.generator.session_id(),
        };

        let token = match self.issue_token(&session_id).await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "token regeneration failed, serving response without cookies");
                return;
            }
        };

        resp.headers.append("Set-Cookie", self.session_cookie(&session_id));
        resp.headers.append("Set-Cookie", self.token_cookie(&token));

        self.bump_counter().await;

        match self.store.sweep_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "swept expired tokens"),
            Err(e) => warn!(error = %e, "expired token sweep failed"),
        }
    }

    /// Generate and persist a new token for `session_id`.
    pub async fn issue_token(&self, session_id: &str) -> Result<String> {
        let token = self.generator.generate(self.config.token_length)?;
        self.store.put(session_id, &token, Utc::now()).await?;
        debug!(session = %session_id, "issued token");
        Ok(token)
    }

    async fn bump_counter(&self) {
        match self.store.bump_counter(self.config.reseed_threshold).await {
            Ok(tick) if tick.reseed => match self.generator.reseed() {
                Ok(()) => info!(threshold = self.config.reseed_threshold, "reseeded token generator"),
                Err(e) => error!(error = %e, "reseed failed"),
            },
            Ok(_) => {}
            Err(e) => error!(error = %e, "reseed counter update failed"),
        }
    }

    fn token_cookie(&self, token: &str) -> String {
        let mut cookie = format!("{}={}; Path=/", self.config.token_name, token);
        self.push_cookie_attributes(&mut cookie);
        cookie
    }

    fn session_cookie(&self, session_id: &str) -> String {
        let mut cookie = format!("{}={}; Path=/; HttpOnly", self.config.session_cookie_name, session_id);
        self.push_cookie_attributes(&mut cookie);
        cookie
    }

    fn push_cookie_attributes(&self, cookie: &mut String) {
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }
        if let Some(same_site) = self.config.cookie_same_site {
            cookie.push_str("; SameSite=");
            cookie.push_str(same_site.as_str());
        }
    }
}

impl fmt::Debug for CsrfEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfEngine")
            .field("enabled", &self.config.enabled)
            .field("action", &self.config.action.name())
            .field("store", &self.store.store_type())
            .finish()
    }
}

fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_SESSION_ID_LENGTH && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
