//! Logging for csrfguard.
//!
//! Two concerns live here:
//!
//! - [`LogConfig`], read from `CSRFGUARD_*` environment variables, and
//!   [`init_tracing`], which installs a `tracing-subscriber` formatter to
//!   match it;
//! - the [`audit`] trail that records every rejected request.
//!
//! Every crate in the workspace logs through `tracing`, the audit trail
//! included, so one subscriber sees all of it.
//!
//! ```rust,no_run
//! use csrfguard_log::{LogConfig, init_tracing};
//!
//! let config = LogConfig::from_env();
//! init_tracing(&config);
//! tracing::info!(format = ?config.format, "logging ready");
//! ```

pub mod audit;
mod config;
mod level;

pub use audit::{AUDIT_TARGET, AuditEvent, AuditOutcome, AuditSink, LogAuditSink, MemoryAuditSink};
pub use config::{ENV_PREFIX, LogConfig};
pub use level::{Format, Level};

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Filter built from `RUST_LOG` if set, else from the configured level.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.filter_directive()))
}

/// Formatting layer for the configured format, color and timestamps.
pub fn fmt_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer().with_ansi(config.color);
    match (config.format, config.timestamps) {
        (Format::Json, true) => layer.json().boxed(),
        (Format::Json, false) => layer.json().without_time().boxed(),
        (Format::Compact, true) => layer.compact().boxed(),
        (Format::Compact, false) => layer.compact().without_time().boxed(),
        (Format::Pretty, true) => layer.boxed(),
        (Format::Pretty, false) => layer.without_time().boxed(),
    }
}

/// Install a global subscriber matching `config`.
///
/// Returns `false` if another subscriber was already installed.
pub fn init_tracing(config: &LogConfig) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer(config))
        .try_init()
        .is_ok()
}
