//! Error types for the oracle gateway.

use std::time::Duration;
use thiserror::Error;

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error code (e.g. "rate_limit_exceeded").
    pub provider_code: Option<String>,
    /// Request ID from provider (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur when calling the oracle.
///
/// Per-group and per-stage callers recover from `Timeout` and `Unavailable`
/// locally (placeholder substitution); neither propagates past a pipeline or
/// batch boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The call exceeded its time budget.
    #[error("timeout after {0:?}")]
    Timeout(Duration, Option<ErrorContext>),

    /// Transport/auth/protocol failure at the provider.
    #[error("oracle unavailable: {message}")]
    Unavailable {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Invalid request - permanent error, don't retry.
    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Provider refused the request (content policy, etc.) - permanent error.
    #[error("refused: {message}")]
    Refused { message: String },

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn timeout(budget: Duration) -> Self {
        Self::Timeout(budget, None)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            context: None,
        }
    }

    pub fn unavailable_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Unavailable {
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            context: None,
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::Refused {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error is a time-budget expiry (possibly reported by the
    /// HTTP layer rather than our own deadline).
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_, _) => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Get a short error code for logging and diagnostic gap strings.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_, _) => "timeout",
            Self::Unavailable { .. } => "oracle_unavailable",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Refused { .. } => "refused",
            Self::Http(e) if e.is_timeout() => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Timeout(_, context) => context.as_ref(),
            Self::Unavailable { context, .. } => context.as_ref(),
            Self::InvalidRequest { context, .. } => context.as_ref(),
            Self::Refused { .. } => None,
            Self::Http(_) => None,
            Self::Config(_) => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_code_and_predicate() {
        let e = ProviderError::timeout(Duration::from_secs(120));
        assert!(e.is_timeout());
        assert_eq!(e.code(), "timeout");
    }

    #[test]
    fn unavailable_carries_context() {
        let ctx = ErrorContext::new().with_status(503).with_request_id("r-1");
        let e = ProviderError::unavailable_with_context("upstream down", ctx);
        assert_eq!(e.code(), "oracle_unavailable");
        assert_eq!(e.request_id(), Some("r-1"));
        assert!(!e.is_timeout());
    }

    #[test]
    fn config_has_no_context() {
        let e = ProviderError::config("OPENAI_API_KEY not set");
        assert!(e.context().is_none());
        assert_eq!(e.code(), "config_error");
    }
}
