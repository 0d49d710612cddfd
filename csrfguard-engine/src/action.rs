//! What happens to a request that fails validation.

use crate::error::{CsrfError, Result};
use csrfguard_core::{HttpRequest, HttpResponse};
use csrfguard_log::AuditOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FailureAction {
    /// 403 with an empty body.
    #[default]
    Forbidden,
    /// Clear the query string and body, then let the request through.
    Strip,
    /// 302 to `location`; 403 when no location is configured.
    Redirect { location: Option<String> },
    /// 403 with a custom HTML body.
    Message { body: String },
    /// 500 with an empty body.
    InternalServerError,
}

/// Result of applying an action to a request.
#[derive(Debug)]
pub enum ActionOutcome {
    /// Stop here and send this response.
    Respond(HttpResponse),
    /// The request was sanitised and may continue to the origin handler.
    Continue,
}

impl FailureAction {
    /// Build from a configured name plus the values the name depends on.
    pub fn parse(name: &str, redirect_uri: Option<&str>, message: &str) -> Result<Self> {
        let canonical = csrfguard_config::canonical_action(name)
            .ok_or_else(|| CsrfError::InvalidConfig(format!("unknown failure action '{}'", name.trim())))?;
        match canonical {
            "forbidden" => Ok(FailureAction::Forbidden),
            "strip" => Ok(FailureAction::Strip),
            "redirect" => Ok(FailureAction::Redirect {
                location: redirect_uri
                    .map(str::trim)
                    .filter(|uri| !uri.is_empty())
                    .map(str::to_string),
            }),
            "message" => Ok(FailureAction::Message {
                body: message.to_string(),
            }),
            _ => Ok(FailureAction::InternalServerError),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        FailureAction::Redirect {
            location: Some(location.into()),
        }
    }

    pub fn message(body: impl Into<String>) -> Self {
        FailureAction::Message { body: body.into() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FailureAction::Forbidden => "forbidden",
            FailureAction::Strip => "strip",
            FailureAction::Redirect { .. } => "redirect",
            FailureAction::Message { .. } => "message",
            FailureAction::InternalServerError => "internal_server_error",
        }
    }

    /// Status the client sees, or `None` when the request is served.
    pub fn status(&self) -> Option<u16> {
        match self {
            FailureAction::Forbidden | FailureAction::Message { .. } => Some(403),
            FailureAction::Strip => None,
            FailureAction::Redirect { location: Some(_) } => Some(302),
            FailureAction::Redirect { location: None } => Some(403),
            FailureAction::InternalServerError => Some(500),
        }
    }

    pub fn audit_outcome(&self) -> AuditOutcome {
        match self {
            FailureAction::Strip => AuditOutcome::StrippedAndServed,
            _ => AuditOutcome::Denied,
        }
    }

    pub fn apply(&self, req: &mut HttpRequest) -> ActionOutcome {
        match self {
            FailureAction::Forbidden => ActionOutcome::Respond(empty(403)),
            FailureAction::Strip => {
                req.query = None;
                req.body = bytes::Bytes::new();
                req.headers.remove("Content-Length");
                req.headers.remove("Content-Type");
                ActionOutcome::Continue
            }
            FailureAction::Redirect { location: Some(location) } => {
                let mut resp = HttpResponse::found(location.clone());
                resp.headers.set_content_length(0);
                ActionOutcome::Respond(resp)
            }
            FailureAction::Redirect { location: None } => ActionOutcome::Respond(empty(403)),
            FailureAction::Message { body } => {
                ActionOutcome::Respond(HttpResponse::html(body.clone()).with_status(403))
            }
            FailureAction::InternalServerError => ActionOutcome::Respond(empty(500)),
        }
    }
}

fn empty(status: u16) -> HttpResponse {
    let mut resp = HttpResponse::new(status);
    resp.headers.set_content_length(0);
    resp
}
