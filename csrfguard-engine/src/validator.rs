//! Decides whether a request carries a valid token for its session.

use crate::config::CsrfConfig;
use chrono::{DateTime, Utc};
use csrfguard_core::HttpRequest;
use csrfguard_store::{MatchResult, TokenStore};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Set on requests whose path matched the ignore pattern.
pub const IGNORE_MARKER: &str = "csrfp_ignore_set";
/// Set on requests that passed (or were exempt from) validation.
pub const VALIDATED_MARKER: &str = "mod_csrfp_enabled";
/// Set when the response should carry a freshly issued token.
pub const REGENERATE_MARKER: &str = "regen_csrfptoken";

const MARKER_SET: &str = "true";

/// Methods that never change state and are validated only by GET rules.
const SAFE_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS", "TRACE"];

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NoSession,
    MissingToken,
    TokenMismatch,
    TokenExpired,
    StoreUnavailable,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoSession => "no session",
            FailureReason::MissingToken => "missing token",
            FailureReason::TokenMismatch => "token mismatch",
            FailureReason::TokenExpired => "token expired",
            FailureReason::StoreUnavailable => "store unavailable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Static asset; neither validated nor rewritten.
    Ignored,
    /// Safe method with no matching GET rule.
    Exempt,
    /// Token matched the stored one.
    Passed,
    Failed(FailureReason),
}

impl Verdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Failed(_))
    }
}

/// Verdict plus the session id the request presented, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub verdict: Verdict,
    pub session_id: Option<String>,
}

pub struct RequestValidator {
    config: Arc<CsrfConfig>,
    store: Arc<dyn TokenStore>,
}

impl RequestValidator {
    pub fn new(config: Arc<CsrfConfig>, store: Arc<dyn TokenStore>) -> Self {
        Self { config, store }
    }

    /// False for static assets. The answer is cached on the request so the
    /// response stage does not match the pattern again.
    pub fn needs_validation(&self, req: &mut HttpRequest) -> bool {
        if is_marked(req, IGNORE_MARKER) {
            return false;
        }
        if self.config.is_ignored_path(&req.path) {
            trace!(path = %req.path, "static asset, skipping validation");
            req.set_env(IGNORE_MARKER, MARKER_SET);
            return false;
        }
        true
    }

    /// Run the full decision procedure and mark the request accordingly.
    pub async fn validate(&self, req: &mut HttpRequest, now: DateTime<Utc>) -> Validation {
        let session_id = self.session_id(req);
        if !self.needs_validation(req) {
            return Validation {
                verdict: Verdict::Ignored,
                session_id,
            };
        }

        let verdict = self.check(req, session_id.as_deref(), now).await;
        if !verdict.is_failure() {
            req.set_env(REGENERATE_MARKER, MARKER_SET);
            req.set_env(VALIDATED_MARKER, MARKER_SET);
        }
        Validation { verdict, session_id }
    }

    async fn check(&self, req: &HttpRequest, session_id: Option<&str>, now: DateTime<Utc>) -> Verdict {
        if SAFE_METHODS.contains(&req.method.as_str()) && !self.get_rule_applies(req) {
            return Verdict::Exempt;
        }

        let Some(session_id) = session_id else {
            return Verdict::Failed(FailureReason::NoSession);
        };
        let Some(presented) = self.presented_token(req) else {
            return Verdict::Failed(FailureReason::MissingToken);
        };

        match self.store.matches(session_id, &presented, now).await {
            Ok(MatchResult::Valid) => {
                debug!(session = %session_id, method = %req.method, "token accepted");
                Verdict::Passed
            }
            Ok(MatchResult::NotFound) => Verdict::Failed(FailureReason::TokenMismatch),
            Ok(MatchResult::Expired) => Verdict::Failed(FailureReason::TokenExpired),
            Err(e) => {
                error!(error = %e, store = self.store.store_type(), "token lookup failed, rejecting request");
                Verdict::Failed(FailureReason::StoreUnavailable)
            }
        }
    }

    fn get_rule_applies(&self, req: &HttpRequest) -> bool {
        if !matches!(req.method.as_str(), "GET" | "HEAD") {
            return false;
        }
        let host = req.host().unwrap_or("localhost");
        match self.config.matching_get_rule(host, &req.path) {
            Some(rule) => {
                trace!(rule = rule.source(), path = %req.path, "GET rule matched");
                true
            }
            None => false,
        }
    }

    /// Session cookie value, if present and non-empty.
    pub fn session_id(&self, req: &HttpRequest) -> Option<String> {
        req.cookie(&self.config.session_cookie_name)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// Token from the query string, then the body, then a header of the
    /// same name.
    pub fn presented_token(&self, req: &HttpRequest) -> Option<String> {
        let name = self.config.token_name.as_str();
        req.query_param(name)
            .or_else(|| body_token(req, name))
            .or_else(|| req.headers.get(name).map(str::to_string))
            .filter(|token| !token.is_empty())
    }

    /// Effective URL with the token value masked, for the audit trail.
    pub fn audit_url(&self, req: &HttpRequest) -> String {
        let base = req.url_without_query();
        match req.query.as_deref() {
            Some(query) if !query.is_empty() => {
                format!("{base}?{}", redact_query(query, &self.config.token_name))
            }
            _ => base,
        }
    }
}

impl fmt::Debug for RequestValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestValidator")
            .field("token_name", &self.config.token_name)
            .field("store", &self.store.store_type())
            .finish()
    }
}

fn is_marked(req: &HttpRequest, marker: &str) -> bool {
    req.env_var(marker) == Some(MARKER_SET)
}

fn body_token(req: &HttpRequest, name: &str) -> Option<String> {
    match req.headers.media_type().as_deref() {
        None | Some("application/x-www-form-urlencoded") => req.form_param(name),
        Some("application/json") => req.json_field(name),
        Some(_) => None,
    }
}

fn redact_query(query: &str, name: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if decoded_key(pair).as_deref() == Some(name) => format!("{key}=[REDACTED]"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Key of one `key=value` pair, percent-decoded the same way lookups decode it.
fn decoded_key(pair: &str) -> Option<String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(pair)
        .ok()?
        .into_iter()
        .next()
        .map(|(key, _)| key)
}
