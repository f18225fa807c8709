use std::time::Duration;

use thiserror::Error;

/// Errors from embedding and generation providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[cfg(feature = "gemini")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider answered, but not in the expected shape.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("local inference failed: {0}")]
    Inference(String),

    /// JSON output was required but the model produced something else.
    #[error("generation is not valid JSON: {message}")]
    GenerationParse { message: String, raw: String },
}

impl ProviderError {
    /// Transport failures and 5xx responses are worth another attempt; 4xx never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            #[cfg(feature = "gemini")]
            Self::Http(e) => !e.status().is_some_and(|s| s.is_client_error()),
            Self::Server { status, .. } => *status >= 500,
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}
