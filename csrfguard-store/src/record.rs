//! Stored token rows and the results of comparing against them.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use subtle::ConstantTimeEq;

/// The active token of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub session_id: String,
    pub token: String,
    /// Issue time, kept at whole-second precision.
    pub issued_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(session_id: impl Into<String>, token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            token: token.into(),
            issued_at: issued_at.with_nanosecond(0).unwrap_or(issued_at),
        }
    }

    /// True once more than `window` has elapsed since issue.
    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let window = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        (now - self.issued_at).num_seconds() > window
    }

    /// Compare a presented token against this record.
    ///
    /// The byte comparison runs in constant time. A mismatch is reported
    /// as `NotFound`: the caller learns nothing about the stored value.
    pub fn check(&self, presented: &str, now: DateTime<Utc>, window: Duration) -> MatchResult {
        let equal: bool = self.token.as_bytes().ct_eq(presented.as_bytes()).into();
        if !equal {
            MatchResult::NotFound
        } else if self.is_expired(now, window) {
            MatchResult::Expired
        } else {
            MatchResult::Valid
        }
    }
}

/// Outcome of [`crate::TokenStore::matches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    Valid,
    NotFound,
    Expired,
}

impl MatchResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, MatchResult::Valid)
    }
}

/// Result of one reseed counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterTick {
    /// Counter value produced by this increment.
    pub value: u64,
    /// Set on exactly one caller: the one whose increment reached the
    /// threshold and reset the counter to zero.
    pub reseed: bool,
}
