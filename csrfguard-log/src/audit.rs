//! Audit trail for rejected requests.
//!
//! Every request that fails CSRF validation produces one [`AuditEvent`],
//! recorded through an [`AuditSink`] before the configured failure action
//! runs. The default sink emits a `tracing` warn event on the
//! `csrfguard::audit` target.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Log target used by [`LogAuditSink`].
pub const AUDIT_TARGET: &str = "csrfguard::audit";

/// What happened to the offending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditOutcome {
    /// The request was answered by the engine and never reached the origin.
    #[serde(rename = "denied")]
    Denied,
    /// Parameters and body were cleared and the request was served anyway.
    #[serde(rename = "strip & served")]
    StrippedAndServed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Denied => "denied",
            AuditOutcome::StrippedAndServed => "strip & served",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single suspected forgery attempt.
///
/// `url` is expected to have token values already redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub action: String,
    pub reason: String,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
}

impl AuditEvent {
    pub fn new(
        outcome: AuditOutcome,
        action: impl Into<String>,
        reason: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            outcome,
            action: action.into(),
            reason: reason.into(),
            method: method.into(),
            url: url.into(),
            session_id: None,
            remote_addr: None,
        }
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CSRF ATTACK, {}, action={}, reason={}, method={}, url={}",
            self.outcome, self.action, self.reason, self.method, self.url
        )?;
        if let Some(id) = &self.session_id {
            write!(f, ", session={id}")?;
        }
        if let Some(addr) = &self.remote_addr {
            write!(f, ", remote={addr}")?;
        }
        Ok(())
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Emits each event as a warn-level `tracing` event on [`AUDIT_TARGET`],
/// with the event's parts as structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: &AuditEvent) {
        warn!(
            target: AUDIT_TARGET,
            outcome = %event.outcome,
            action = %event.action,
            reason = %event.reason,
            method = %event.method,
            url = %event.url,
            session = event.session_id.as_deref(),
            remote = event.remote_addr.as_deref(),
            "{event}"
        );
    }
}

/// Keeps events in memory. Useful in tests and for admin endpoints.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}
