// ============================================
// MENULENS - Error Taxonomy
// ============================================

use serde::Serialize;
use thiserror::Error;

/// Structured error codes used for retry decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Configuration,
    Transport,
    Timeout,
    Unauthorized,
    QuotaExceeded,
    InvalidRequest,
    Api,
    Parse,
    Offline,
    TrialExhausted,
    Storage,
}

/// Every failure the analysis core can produce.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Missing or invalid credentials/endpoints. Raised at construction or switch time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Authorization failed: {0}")]
    Unauthorized(String),

    #[error("Quota or rate limit exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse model output: {0}")]
    Parse(String),

    #[error("Offline: no network connection and no cached analysis for this menu")]
    Offline,

    #[error("Trial limit reached: {0}")]
    TrialExhausted(String),

    #[error("Cache storage error: {0}")]
    Storage(String),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AnalysisError::Configuration(_) => ErrorCode::Configuration,
            AnalysisError::Transport(_) => ErrorCode::Transport,
            AnalysisError::Timeout { .. } => ErrorCode::Timeout,
            AnalysisError::Unauthorized(_) => ErrorCode::Unauthorized,
            AnalysisError::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            AnalysisError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            AnalysisError::Api { .. } => ErrorCode::Api,
            AnalysisError::Parse(_) => ErrorCode::Parse,
            AnalysisError::Offline => ErrorCode::Offline,
            AnalysisError::TrialExhausted(_) => ErrorCode::TrialExhausted,
            AnalysisError::Storage(_) => ErrorCode::Storage,
        }
    }

    /// Whether another attempt of the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Transport(_) | AnalysisError::Timeout { .. } => true,
            AnalysisError::Api { status, .. } => *status >= 500,
            AnalysisError::Configuration(_)
            | AnalysisError::Unauthorized(_)
            | AnalysisError::QuotaExceeded(_)
            | AnalysisError::InvalidRequest(_)
            | AnalysisError::Parse(_)
            | AnalysisError::Offline
            | AnalysisError::TrialExhausted(_)
            | AnalysisError::Storage(_) => false,
        }
    }

    /// Map a non-success HTTP status and its error message to a structured error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => AnalysisError::Unauthorized(message),
            429 => AnalysisError::QuotaExceeded(message),
            400 | 404 | 422 => AnalysisError::InvalidRequest(message),
            _ => AnalysisError::Api { status, message },
        }
    }

    /// Classify a vendor error that arrived without a usable HTTP status.
    ///
    /// Only used for error payloads embedded in otherwise successful replies;
    /// everything with a status goes through [`AnalysisError::from_status`].
    pub fn from_vendor_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let auth_patterns = [
            "permission",
            "unauthorized",
            "unauthenticated",
            "api key",
            "forbidden",
        ];
        let quota_patterns = ["quota", "rate limit", "resource_exhausted", "too many requests"];
        let request_patterns = ["invalid_argument", "invalid request", "malformed", "bad request"];

        if auth_patterns.iter().any(|p| lower.contains(p)) {
            AnalysisError::Unauthorized(message)
        } else if quota_patterns.iter().any(|p| lower.contains(p)) {
            AnalysisError::QuotaExceeded(message)
        } else if request_patterns.iter().any(|p| lower.contains(p)) {
            AnalysisError::InvalidRequest(message)
        } else {
            AnalysisError::Transport(message)
        }
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs can carry credentials
        let err = err.without_url();
        if let Some(status) = err.status() {
            return AnalysisError::from_status(status.as_u16(), err.to_string());
        }
        if err.is_builder() {
            return AnalysisError::Configuration(err.to_string());
        }
        AnalysisError::Transport(err.to_string())
    }
}

impl From<rusqlite::Error> for AnalysisError {
    fn from(err: rusqlite::Error) -> Self {
        AnalysisError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AnalysisError::from_status(401, "no").code(), ErrorCode::Unauthorized);
        assert_eq!(AnalysisError::from_status(403, "no").code(), ErrorCode::Unauthorized);
        assert_eq!(AnalysisError::from_status(429, "slow down").code(), ErrorCode::QuotaExceeded);
        assert_eq!(AnalysisError::from_status(400, "bad").code(), ErrorCode::InvalidRequest);
        assert_eq!(AnalysisError::from_status(503, "busy").code(), ErrorCode::Api);
    }

    #[test]
    fn test_retryable_codes() {
        assert!(AnalysisError::Transport("reset".into()).is_retryable());
        assert!(AnalysisError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(AnalysisError::from_status(502, "bad gateway").is_retryable());
        assert!(!AnalysisError::from_status(429, "rate limit").is_retryable());
        assert!(!AnalysisError::Parse("no JSON object found".into()).is_retryable());
    }

    #[test]
    fn test_vendor_message_fallback() {
        let err = AnalysisError::from_vendor_message("Rate limit exceeded for project");
        assert_eq!(err.code(), ErrorCode::QuotaExceeded);

        let err = AnalysisError::from_vendor_message("Permission denied on resource");
        assert_eq!(err.code(), ErrorCode::Unauthorized);

        let err = AnalysisError::from_vendor_message("upstream connection reset");
        assert_eq!(err.code(), ErrorCode::Transport);
    }
}
