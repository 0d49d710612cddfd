//! The deployment settings document.

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_TOKEN_NAME: &str = "csrfp_token";
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "CSRFPSESSID";
pub const DEFAULT_TOKEN_LENGTH: usize = 15;
pub const MIN_TOKEN_LENGTH: usize = 12;
pub const MAX_TOKEN_LENGTH: usize = 128;
pub const MAX_TOKEN_NAME_LENGTH: usize = 40;
pub const DEFAULT_TOKEN_EXPIRY_SECS: u64 = 1800;
pub const DEFAULT_RESEED_THRESHOLD: u64 = 10_000;
pub const DEFAULT_ERROR_MESSAGE: &str = "<h2>ACCESS FORBIDDEN BY OWASP CSRF_PROTECTOR!</h2>";
pub const DEFAULT_JS_FILE_PATH: &str = "http://localhost/csrfp_js/csrfprotector.js";
pub const DEFAULT_DISABLED_JS_MESSAGE: &str = "This site attempts to protect users against \
<a href=\"https://www.owasp.org/index.php/Cross-Site_Request_Forgery_%28CSRF%29\">\
Cross-Site Request Forgeries </a> attacks. In order to do so, you must have JavaScript \
enabled in your web browser otherwise this site will fail to work correctly for you. \
See details of your web browser for how to enable JavaScript.";
/// Static assets: images, scripts, stylesheets and text formats.
pub const DEFAULT_IGNORE_PATTERN: &str = r"(?i)\.(jpe?g|gif|png|js|css|xml|xsl|json|txt|csv)$";

pub const ACTIONS: &[&str] = &["forbidden", "strip", "redirect", "message", "internal_server_error"];
/// Resolve an action name or its numeric alias (`0`..`4`, in [`ACTIONS`] order).
pub fn canonical_action(value: &str) -> Option<&'static str> {
    let value = value.trim();
    if let Ok(index) = value.parse::<usize>() {
        return ACTIONS.get(index).copied();
    }
    ACTIONS.iter().copied().find(|a| a.eq_ignore_ascii_case(value))
}

pub const STORE_BACKENDS: &[&str] = &["memory", "redis"];
pub const SAME_SITE_VALUES: &[&str] = &["strict", "lax", "none"];

/// Everything an operator can set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enabled: bool,
    /// One of [`ACTIONS`].
    pub action: String,
    pub error_redirection_uri: Option<String>,
    pub error_custom_message: String,
    pub js_file_path: String,
    pub token_length: usize,
    pub token_name: String,
    pub session_cookie_name: String,
    pub disabled_js_message: String,
    /// Matched against the last path segment.
    pub ignore_pattern: String,
    /// Regexes matched against `http(s)://host/path` to opt GET requests in.
    pub verify_get_for: Vec<String>,
    pub token_expiry_secs: u64,
    pub reseed_threshold: u64,
    pub cookie_secure: bool,
    pub cookie_same_site: Option<String>,
    pub store: StoreSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            action: "forbidden".to_string(),
            error_redirection_uri: None,
            error_custom_message: DEFAULT_ERROR_MESSAGE.to_string(),
            js_file_path: DEFAULT_JS_FILE_PATH.to_string(),
            token_length: DEFAULT_TOKEN_LENGTH,
            token_name: DEFAULT_TOKEN_NAME.to_string(),
            session_cookie_name: DEFAULT_SESSION_COOKIE_NAME.to_string(),
            disabled_js_message: DEFAULT_DISABLED_JS_MESSAGE.to_string(),
            ignore_pattern: DEFAULT_IGNORE_PATTERN.to_string(),
            verify_get_for: Vec::new(),
            token_expiry_secs: DEFAULT_TOKEN_EXPIRY_SECS,
            reseed_threshold: DEFAULT_RESEED_THRESHOLD,
            cookie_secure: false,
            cookie_same_site: None,
            store: StoreSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// One of [`STORE_BACKENDS`].
    pub backend: String,
    pub url: String,
    pub namespace: String,
    pub timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: "redis://127.0.0.1:6379".to_string(),
            namespace: "csrfguard".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl Settings {
    /// Apply `KEY=value` overrides whose keys have had their prefix removed
    /// and been lowercased, e.g. `token_length` or `store_backend`.
    ///
    /// Unknown keys are ignored: the prefix is shared with the logger.
    pub fn apply_overrides(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        for (key, raw) in vars {
            let value = raw.trim();
            match key.as_str() {
                "enabled" => self.enabled = parse_bool(key, value)?,
                "action" => self.action = value.to_ascii_lowercase(),
                "error_redirection_uri" => {
                    self.error_redirection_uri = (!value.is_empty()).then(|| value.to_string())
                }
                "error_custom_message" => self.error_custom_message = raw.clone(),
                "js_file_path" => self.js_file_path = value.to_string(),
                "token_length" => self.token_length = parse_num(key, value)?,
                "token_name" => self.token_name = value.to_string(),
                "session_cookie_name" => self.session_cookie_name = value.to_string(),
                "disabled_js_message" => self.disabled_js_message = raw.clone(),
                "ignore_pattern" => self.ignore_pattern = value.to_string(),
                "verify_get_for" => {
                    self.verify_get_for = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                "token_expiry_secs" => self.token_expiry_secs = parse_num(key, value)?,
                "reseed_threshold" => self.reseed_threshold = parse_num(key, value)?,
                "cookie_secure" => self.cookie_secure = parse_bool(key, value)?,
                "cookie_same_site" => {
                    self.cookie_same_site = (!value.is_empty()).then(|| value.to_string())
                }
                "store_backend" => self.store.backend = value.to_ascii_lowercase(),
                "store_url" => self.store.url = value.to_string(),
                "store_namespace" => self.store.namespace = value.to_string(),
                "store_timeout_ms" => self.store.timeout_ms = parse_num(key, value)?,
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(key, format!("'{value}' is not a boolean"))),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid_value(key, format!("'{value}' is not a number")))
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        if canonical_action(&self.action).is_none() {
            ConfigValidator::one_of(&self.action, ACTIONS, "action")?;
        }
        ConfigValidator::in_range(self.token_length, MIN_TOKEN_LENGTH, MAX_TOKEN_LENGTH, "token_length")?;
        ConfigValidator::is_token_name(&self.token_name, MAX_TOKEN_NAME_LENGTH, "token_name")?;
        ConfigValidator::is_token_name(
            &self.session_cookie_name,
            MAX_TOKEN_NAME_LENGTH,
            "session_cookie_name",
        )?;
        if self.token_name == self.session_cookie_name {
            return Err(ConfigError::ValidationError(
                "token_name and session_cookie_name must differ".to_string(),
            ));
        }
        ConfigValidator::not_empty(&self.ignore_pattern, "ignore_pattern")?;
        ConfigValidator::not_empty(&self.js_file_path, "js_file_path")?;
        ConfigValidator::in_range(self.token_expiry_secs, 1, u64::from(u32::MAX), "token_expiry_secs")?;
        ConfigValidator::in_range(self.reseed_threshold, 1, u64::MAX, "reseed_threshold")?;
        if let Some(same_site) = &self.cookie_same_site {
            ConfigValidator::one_of(same_site, SAME_SITE_VALUES, "cookie_same_site")?;
        }
        if canonical_action(&self.action) == Some("redirect") && self.error_redirection_uri.is_none() {
            tracing::warn!("action is redirect but error_redirection_uri is unset; failures will get 403");
        }
        self.store.validate()
    }
}

impl Validate for StoreSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::one_of(&self.backend, STORE_BACKENDS, "store.backend")?;
        ConfigValidator::not_empty(&self.namespace, "store.namespace")?;
        ConfigValidator::in_range(self.timeout_ms, 1, 60_000, "store.timeout_ms")?;
        if self.backend.eq_ignore_ascii_case("redis") {
            ConfigValidator::not_empty(&self.url, "store.url")?;
        }
        Ok(())
    }
}
