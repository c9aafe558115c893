use thiserror::Error;

/// Errors raised by a provider executor
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API key is required")]
    MissingCredentials { provider: String },

    #[error("upstream returned {status} {reason}: {body}")]
    Upstream {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("upstream request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("upstream returned an empty payload")]
    EmptyPayload,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

impl ProviderError {
    /// Build an `Upstream` error from a failed response, consuming its body.
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        ProviderError::Upstream {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body,
        }
    }
}

/// Errors raised by the dispatcher
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider {0} does not implement executeRequest")]
    ExecutorMissing(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
