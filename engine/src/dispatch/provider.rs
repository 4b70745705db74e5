//! Capability provider contract
//!
//! A provider serves one or more capabilities. It reports failures through
//! [`ProviderError`]; the dispatcher turns those into envelope errors so raw
//! provider detail never reaches a caller.

use async_trait::async_trait;
use sdk::envelope::{Capability, EnvelopeData, EnvelopeError, Snippet};
use sdk::types::CapabilityRequest;

/// Classified provider failure
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider bug, including a panic inside the provider call
    #[error("Internal provider error: {0}")]
    Internal(String),

    /// Upstream rejected the request (HTTP status)
    #[error("Upstream error: HTTP {0}")]
    Upstream(u16),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unsupported capability: {0}")]
    Unsupported(Capability),
}

impl ProviderError {
    /// Stable error code carried in the envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection(_) => "connection_error",
            Self::Network(_) => "network_error",
            Self::RateLimited => "rate_limited",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Internal(_) => "internal_error",
            Self::Upstream(_) => "provider_error",
            Self::NotConfigured(_) => "provider_not_configured",
            Self::Unsupported(_) => "capability_unavailable",
        }
    }

    /// Whether retrying the call may succeed
    ///
    /// Transport failures and programming/type errors are retryable.
    /// Upstream rejections, rate limits included, and configuration
    /// problems are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::Connection(_)
                | Self::Network(_)
                | Self::InvalidResponse(_)
                | Self::Internal(_)
        )
    }

    /// User-safe message; never includes provider payloads
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout => "The search provider did not respond in time",
            Self::Connection(_) | Self::Network(_) => "The search provider could not be reached",
            Self::RateLimited => "The search provider is busy",
            Self::InvalidResponse(_) | Self::Internal(_) => {
                "The search provider returned an unexpected response"
            }
            Self::Upstream(_) => "The search provider could not complete the request",
            Self::NotConfigured(_) => "The search provider is not configured",
            Self::Unsupported(_) => "This search type is not available",
        }
    }

    pub fn to_envelope_error(&self) -> EnvelopeError {
        EnvelopeError::new(self.code(), self.user_message(), self.is_retryable())
    }
}

/// Successful provider result
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub data: EnvelopeData,
    pub snippets: Vec<Snippet>,
}

impl ProviderResponse {
    pub fn new(data: EnvelopeData) -> Self {
        Self {
            data,
            snippets: Vec::new(),
        }
    }
}

/// Backend that serves one or more capabilities
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "serpapi")
    fn name(&self) -> &str;

    /// Capabilities this provider can serve
    fn capabilities(&self) -> &[Capability];

    /// Run one search
    async fn search(&self, request: &CapabilityRequest) -> Result<ProviderResponse, ProviderError>;
}
