//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider {provider} unavailable: {last_error}")]
    Unavailable { provider: String, last_error: String },

    #[error("All LLM providers failed: {}", attempts.join("; "))]
    AllProvidersFailed { attempts: Vec<String> },
}

impl LlmError {
    /// Check if this error is recoverable by retry or fallback
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::Json(_) => false,
            LlmError::Unavailable { .. } => false,
            LlmError::AllProvidersFailed { .. } => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );
        assert!(
            LlmError::ApiError {
                status: 503,
                message: "overloaded".to_string()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::ApiError {
                status: 400,
                message: "bad request".to_string()
            }
            .is_retryable()
        );
        assert!(!LlmError::InvalidResponse("bad json".to_string()).is_retryable());
        assert!(
            !LlmError::AllProvidersFailed {
                attempts: vec!["anthropic: down".to_string()]
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_composite_error_names_every_attempt() {
        let err = LlmError::AllProvidersFailed {
            attempts: vec!["anthropic: 500".to_string(), "openai: timeout".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("anthropic: 500"));
        assert!(text.contains("openai: timeout"));
    }

    #[test]
    fn test_retry_after() {
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
        assert_eq!(
            LlmError::InvalidResponse("x".to_string()).retry_after(),
            None
        );
    }
}
