//! Immutable runtime snapshot of the protection settings.

use crate::action::FailureAction;
use crate::error::{CsrfError, Result};
use csrfguard_config::{Settings, Validate};
use csrfguard_store::{StoreConfig, StoreType};
use regex::Regex;
use std::time::Duration;

/// Value of the `X-Protected-By` header on validated responses.
pub const PROTECTED_BY: &str = concat!("CSRFGuard ", env!("CARGO_PKG_VERSION"));

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A compiled `verify_get_for` pattern.
#[derive(Debug, Clone)]
pub struct GetRule {
    source: String,
    pattern: Regex,
}

impl GetRule {
    pub fn new(source: &str) -> Result<Self> {
        let pattern = Regex::new(source).map_err(|e| CsrfError::pattern(source, e))?;
        Ok(Self {
            source: source.to_string(),
            pattern,
        })
    }

    /// The pattern as configured; also handed to the client script.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }
}

/// CSRF protection configuration
///
/// Built once at startup and shared behind an `Arc`. Nothing in the request
/// pipeline mutates it.
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Master switch; when off every request and response passes untouched
    pub enabled: bool,

    /// What to do with a request that fails validation
    pub action: FailureAction,

    /// URL of the client script that decorates links and forms
    pub js_file_path: String,

    /// Length of generated tokens
    pub token_length: usize,

    /// Form field, query parameter, header and cookie name of the token
    pub token_name: String,

    /// Cookie carrying the session id
    pub session_cookie_name: String,

    /// Body of the `<noscript>` notice
    pub disabled_js_message: String,

    /// Paths whose last segment matches are never validated or rewritten
    pub ignore_pattern: Regex,

    /// URLs for which GET and HEAD requests are validated, in order
    pub verify_get_for: Vec<GetRule>,

    /// Age after which an issued token stops validating
    pub token_expiry: Duration,

    /// Tokens issued between generator reseeds
    pub reseed_threshold: u64,

    /// Cookie secure flag (HTTPS only)
    pub cookie_secure: bool,

    /// Cookie SameSite policy
    pub cookie_same_site: Option<SameSite>,

    /// Token storage backend
    pub store: StoreConfig,
}

impl CsrfConfig {
    /// Start from the built-in defaults.
    pub fn builder() -> CsrfConfigBuilder {
        CsrfConfigBuilder::default()
    }

    /// Validate `settings` and compile its patterns.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let action = FailureAction::parse(
            &settings.action,
            settings.error_redirection_uri.as_deref(),
            &settings.error_custom_message,
        )?;

        let ignore_pattern = Regex::new(&settings.ignore_pattern)
            .map_err(|e| CsrfError::pattern(&settings.ignore_pattern, e))?;

        let verify_get_for = settings
            .verify_get_for
            .iter()
            .map(|source| GetRule::new(source))
            .collect::<Result<Vec<_>>>()?;

        let cookie_same_site = match settings.cookie_same_site.as_deref() {
            Some(value) => Some(SameSite::parse(value).ok_or_else(|| {
                CsrfError::InvalidConfig(format!("unknown SameSite value '{value}'"))
            })?),
            None => None,
        };

        let token_expiry = Duration::from_secs(settings.token_expiry_secs);
        let backend: StoreType = settings.store.backend.parse()?;
        let store = StoreConfig {
            backend,
            url: settings.store.url.clone(),
            namespace: settings.store.namespace.clone(),
            expiry_window: token_expiry,
            timeout: Duration::from_millis(settings.store.timeout_ms),
        };

        Ok(Self {
            enabled: settings.enabled,
            action,
            js_file_path: settings.js_file_path.clone(),
            token_length: settings.token_length,
            token_name: settings.token_name.clone(),
            session_cookie_name: settings.session_cookie_name.clone(),
            disabled_js_message: settings.disabled_js_message.clone(),
            ignore_pattern,
            verify_get_for,
            token_expiry,
            reseed_threshold: settings.reseed_threshold,
            cookie_secure: settings.cookie_secure,
            cookie_same_site,
            store,
        })
    }

    /// Whether the last path segment is a static asset.
    pub fn is_ignored_path(&self, path: &str) -> bool {
        let segment = path.rsplit('/').next().unwrap_or(path);
        !segment.is_empty() && self.ignore_pattern.is_match(segment)
    }

    /// First GET rule matching either scheme of `host` + `path`.
    pub fn matching_get_rule(&self, host: &str, path: &str) -> Option<&GetRule> {
        if self.verify_get_for.is_empty() {
            return None;
        }
        let http = format!("http://{host}{path}");
        let https = format!("https://{host}{path}");
        self.verify_get_for
            .iter()
            .find(|rule| rule.is_match(&http) || rule.is_match(&https))
    }
}

/// Typed setters over [`Settings`]; `build` validates and compiles.
#[derive(Debug, Clone, Default)]
pub struct CsrfConfigBuilder {
    settings: Settings,
}

impl CsrfConfigBuilder {
    pub fn from_settings(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.settings.enabled = enabled;
        self
    }

    pub fn forbidden(mut self) -> Self {
        self.settings.action = "forbidden".to_string();
        self
    }

    pub fn strip(mut self) -> Self {
        self.settings.action = "strip".to_string();
        self
    }

    pub fn redirect_to(mut self, uri: impl Into<String>) -> Self {
        self.settings.action = "redirect".to_string();
        self.settings.error_redirection_uri = Some(uri.into());
        self
    }

    pub fn message(mut self, body: impl Into<String>) -> Self {
        self.settings.action = "message".to_string();
        self.settings.error_custom_message = body.into();
        self
    }

    pub fn internal_server_error(mut self) -> Self {
        self.settings.action = "internal_server_error".to_string();
        self
    }

    pub fn with_js_file_path(mut self, path: impl Into<String>) -> Self {
        self.settings.js_file_path = path.into();
        self
    }

    pub fn with_token_length(mut self, length: usize) -> Self {
        self.settings.token_length = length;
        self
    }

    pub fn with_token_name(mut self, name: impl Into<String>) -> Self {
        self.settings.token_name = name.into();
        self
    }

    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    pub fn with_disabled_js_message(mut self, message: impl Into<String>) -> Self {
        self.settings.disabled_js_message = message.into();
        self
    }

    pub fn with_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.settings.ignore_pattern = pattern.into();
        self
    }

    /// Append a GET verification pattern.
    pub fn verify_get(mut self, pattern: impl Into<String>) -> Self {
        self.settings.verify_get_for.push(pattern.into());
        self
    }

    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.settings.token_expiry_secs = expiry.as_secs();
        self
    }

    pub fn with_reseed_threshold(mut self, threshold: u64) -> Self {
        self.settings.reseed_threshold = threshold;
        self
    }

    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.settings.cookie_secure = secure;
        self
    }

    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.settings.cookie_same_site = Some(same_site.as_str().to_string());
        self
    }

    pub fn with_redis_store(mut self, url: impl Into<String>) -> Self {
        self.settings.store.backend = "redis".to_string();
        self.settings.store.url = url.into();
        self
    }

    pub fn with_store_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.settings.store.namespace = namespace.into();
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.settings.store.timeout_ms = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        self
    }

    pub fn build(self) -> Result<CsrfConfig> {
        CsrfConfig::from_settings(&self.settings)
    }
}
