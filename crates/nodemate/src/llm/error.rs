//! LLM error types.

use thiserror::Error;

use super::validate::ValidationError;

/// Errors that can occur when building or calling an LLM provider.
///
/// Backend-specific variants carry the provider label (e.g. `Claude`) so the
/// rendered message always names the failing backend.
#[derive(Debug, Error)]
pub enum LLMError {
    /// No API key was supplied.
    #[error("API key is required for {0}")]
    MissingCredential(String),

    /// Provider identifier outside the known set.
    #[error("unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    /// Model is not in the provider's supported list.
    #[error("model {model} is not supported by {provider}")]
    UnsupportedModel {
        provider: &'static str,
        model: String,
    },

    /// Malformed conversation history.
    #[error("invalid conversation: {0}")]
    Validation(#[from] ValidationError),

    /// HTTP request failed
    #[error("{provider} API error: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    /// API returned an error response
    #[error("{provider} API error (status {status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Reply was empty or not text.
    #[error("{provider} returned an unusable response: {reason}")]
    UnsupportedContent {
        provider: &'static str,
        reason: String,
    },

    /// Request exceeded its deadline.
    #[error("{provider} request timed out")]
    Timeout { provider: &'static str },

    /// Byte stream ended before the backend signalled completion.
    #[error("{provider} stream ended unexpectedly")]
    StreamInterrupted { provider: &'static str },
}

impl LLMError {
    /// Wrap a transport failure, keeping timeouts distinguishable.
    pub fn transport(provider: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LLMError::Timeout { provider }
        } else {
            LLMError::Transport {
                provider,
                message: err.to_string(),
            }
        }
    }

    pub fn unsupported_content(provider: &'static str, reason: impl Into<String>) -> Self {
        LLMError::UnsupportedContent {
            provider,
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LLMError::Timeout { .. })
    }
}

/// Return the response unchanged if it succeeded, otherwise an `Api` error
/// carrying the status and body.
pub(crate) async fn check_response(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, LLMError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(LLMError::Api {
        provider,
        status,
        message,
    })
}
