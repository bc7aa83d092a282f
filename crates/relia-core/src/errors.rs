//! Error taxonomy for the lookup engine and its collaborators.

use crate::quota::QuotaScope;
use std::time::Duration;
use thiserror::Error;

/// Failures reading from or appending to the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation did not complete within the configured bound.
    #[error("store timed out after {0:?}")]
    Timeout(Duration),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection lost, lock poisoned, worker panicked, injected failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Failures of a single call to the external analysis service.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{backend} error: {message}")]
    Service {
        backend: String,
        message: String,
        retryable: bool,
        http_status: Option<u16>,
    },

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered but the payload could not be parsed or repaired.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Missing API key, unknown provider.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn service(backend: &str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Service {
            backend: backend.to_string(),
            message: message.into(),
            retryable,
            http_status: None,
        }
    }

    /// Whether another attempt on the same backend may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Service { retryable, .. } => *retryable,
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::MalformedPayload(_) => false,
            Self::Config(_) => false,
            Self::Cancelled => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Service { .. } => "service_error",
            Self::Timeout(_) => "timeout",
            Self::Http(_) => "http_error",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::Config(_) => "config_error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Caller-visible failures of a lookup request.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Terminal; callers should not retry today.
    #[error("{scope} daily limit reached ({used}/{limit}); try again tomorrow")]
    QuotaExceeded {
        scope: QuotaScope,
        used: u32,
        limit: u32,
    },

    /// Only surfaced where a store read is mandatory (quota checks).
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("malformed analysis payload: {0}")]
    MalformedPayload(String),

    #[error("analysis failed after {attempts} attempt(s): {last}")]
    AnalysisFailed { attempts: u32, last: String },

    #[error("request cancelled")]
    Cancelled,
}

impl EngineError {
    /// Stable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "E_INVALID_REQUEST",
            Self::QuotaExceeded { .. } => "E_QUOTA_EXCEEDED",
            Self::StoreUnavailable(_) => "E_STORE_UNAVAILABLE",
            Self::MalformedPayload(_) => "E_MALFORMED_PAYLOAD",
            Self::AnalysisFailed { .. } => "E_ANALYSIS_FAILED",
            Self::Cancelled => "E_CANCELLED",
        }
    }

    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::InvalidRequest(_))
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability() {
        assert!(AnalysisError::service("gemini-2.5-flash", "503", true).is_retryable());
        assert!(!AnalysisError::service("gemini-2.5-flash", "400", false).is_retryable());
        assert!(AnalysisError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!AnalysisError::MalformedPayload("x".into()).is_retryable());
        assert!(!AnalysisError::Cancelled.is_retryable());
    }

    #[test]
    fn quota_message_names_scope() {
        let e = EngineError::QuotaExceeded {
            scope: QuotaScope::Caller,
            used: 5,
            limit: 5,
        };
        assert_eq!(e.code(), "E_QUOTA_EXCEEDED");
        assert!(e.to_string().starts_with("per-caller daily limit reached (5/5)"));
        assert!(e.is_user_visible());
    }
}
