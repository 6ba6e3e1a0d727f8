use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::constants::DIAGNOSTIC_BODY_LIMIT;
use crate::upstream::ForbiddenRedirect;

/// Raw upstream reply kept for debugging a rejected call.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamDiagnostics {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i64>,
    pub body: String,
}

impl UpstreamDiagnostics {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            errno: None,
            body: truncate_body(body),
        }
    }

    pub fn with_errno(mut self, errno: Option<i64>) -> Self {
        self.errno = errno;
        self
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(DIAGNOSTIC_BODY_LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Missing required parameter: {}", .required.join(", "))]
    MissingParameter { required: Vec<&'static str> },

    #[error("Invalid or missing mode")]
    InvalidMode,

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("jsToken not found in share page")]
    TokenNotFound,

    #[error("Failed to extract jsToken from share page; a cookie may be required for this share")]
    TokenExtractionFailed,

    #[error("Share requires password or captcha verification")]
    VerificationRequired,

    #[error("Upstream host is not allowed: {0}")]
    ForbiddenUpstreamHost(String),

    #[error("Share '{0}' has not been resolved yet; call mode=resolve first")]
    NotResolved(String),

    #[error("Upstream returned incomplete metadata: {0}")]
    IncompleteMetadata(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream rejected the request")]
    UpstreamRejected(UpstreamDiagnostics),

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Upstream playlist is malformed")]
    MalformedPlaylist(UpstreamDiagnostics),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(forbidden) = forbidden_redirect(&e) {
            GatewayError::ForbiddenUpstreamHost(forbidden.0.clone())
        } else if e.is_timeout() {
            GatewayError::UpstreamTimeout
        } else {
            // Drop the URL: it carries the jsToken in its query string.
            GatewayError::UpstreamUnavailable(e.without_url().to_string())
        }
    }
}

fn forbidden_redirect(e: &reqwest::Error) -> Option<&ForbiddenRedirect> {
    if !e.is_redirect() {
        return None;
    }
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        if let Some(forbidden) = inner.downcast_ref::<ForbiddenRedirect>() {
            return Some(forbidden);
        }
        source = inner.source();
    }
    None
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingParameter { .. }
            | GatewayError::InvalidMode
            | GatewayError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            GatewayError::TokenNotFound
            | GatewayError::TokenExtractionFailed
            | GatewayError::VerificationRequired
            | GatewayError::ForbiddenUpstreamHost(_) => StatusCode::FORBIDDEN,
            GatewayError::NotResolved(_) => StatusCode::NOT_FOUND,
            GatewayError::IncompleteMetadata(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::UpstreamUnavailable(_)
            | GatewayError::UpstreamRejected(_)
            | GatewayError::MalformedPlaylist(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// JSON envelope; upstream diagnostics only appear when `debug` is set.
    pub fn to_body(&self, debug: bool) -> serde_json::Value {
        let mut body = json!({ "error": self.to_string() });

        match self {
            GatewayError::MissingParameter { required } => {
                body["required"] = json!(required);
            }
            GatewayError::InvalidMode => {
                body["allowed"] = json!(crate::routes::Mode::allowed());
            }
            GatewayError::UpstreamRejected(diag) | GatewayError::MalformedPlaylist(diag)
                if debug =>
            {
                body["upstream"] = json!(diag);
            }
            _ => {}
        }

        body
    }

    pub fn render(self, debug: bool) -> Response {
        let status = self.status_code();

        match &self {
            GatewayError::UpstreamRejected(diag) | GatewayError::MalformedPlaylist(diag) => {
                tracing::warn!("{} (upstream status {})", self, diag.status);
                tracing::debug!("Upstream body: {}", diag.body);
            }
            GatewayError::IncompleteMetadata(_) | GatewayError::Internal(_) => {
                tracing::error!("{}", self)
            }
            GatewayError::UpstreamUnavailable(_) | GatewayError::UpstreamTimeout => {
                tracing::warn!("{}", self)
            }
            _ => {}
        }

        (status, Json(self.to_body(debug))).into_response()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.render(false)
    }
}

pub type AppResult<T> = Result<T, GatewayError>;
