//! Environment-driven logger configuration.

use crate::level::{Format, Level};
use std::env;

/// Prefix shared by every logging environment variable.
pub const ENV_PREFIX: &str = "CSRFGUARD_";

/// Logger configuration.
///
/// Read once from the environment:
///
/// - `CSRFGUARD_DEBUG=1` lowers the default level to debug
/// - `CSRFGUARD_LOG_LEVEL=trace|debug|info|warn|error|off`
/// - `CSRFGUARD_LOG_FORMAT=json|pretty|plain|compact`
/// - `CSRFGUARD_LOG_COLOR=1|0`
/// - `CSRFGUARD_LOG_TIMESTAMPS=1|0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub debug: bool,
    pub level: Level,
    pub format: Format,
    pub color: bool,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Keys are the full variable names, including the prefix.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let debug = var("DEBUG").map(|v| truthy(&v)).unwrap_or(false);

        let level = var("LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = var("LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = var("LOG_COLOR")
            .map(|v| truthy(&v))
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let timestamps = var("LOG_TIMESTAMPS").map(|v| truthy(&v)).unwrap_or(true);

        Self {
            debug,
            level,
            format,
            // JSON lines never carry escape codes
            color: color && format != Format::Json,
            timestamps,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        if format == Format::Json {
            self.color = false;
        }
        self
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
