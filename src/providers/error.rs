use thiserror::Error;

/// Errors returned by the metered external providers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Request timeout")]
    Timeout,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Connection error: {0}")]
    Connection(String),
}

impl ProviderError {
    /// Errors worth retrying after a pause (quota windows, slow upstreams).
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::RateLimited | ProviderError::Timeout)
    }

    /// Network-level failures, retried once by the worker before a lookup fails.
    pub(crate) fn is_network(&self) -> bool {
        matches!(self, ProviderError::Timeout | ProviderError::Connection(_))
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::InvalidData(e.to_string())
        } else {
            ProviderError::Connection(e.to_string())
        }
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderError::RateLimited => "rate_limited",
            ProviderError::Timeout => "timeout",
            ProviderError::NotFound(_) => "not_found",
            ProviderError::InvalidData(_) => "invalid_data",
            ProviderError::Api { .. } => "api",
            ProviderError::Connection(_) => "connection",
        }
    }
}
