//! Capability Dispatch
//!
//! Uniform call surface over the search capabilities. Every call returns an
//! [`Envelope`]; provider errors, timeouts and panics are classified here and
//! never cross the boundary raw.
//!
//! # Call flow
//!
//! 1. Look up `(capability, canonical input)` in the envelope cache
//! 2. Parse the input against the capability's schema
//! 3. Try bound providers in registration order, each under a timeout
//! 4. Cache successful envelopes only
//!
//! `hotel_search` retries once on a retryable failure and degrades to an
//! empty hotel list when the retry fails too.

pub mod cache;
pub mod provider;

pub use cache::{cache_key, canonical_json, EnvelopeCache, MemoryEnvelopeCache};
pub use provider::{CapabilityProvider, ProviderError, ProviderResponse};

use futures::FutureExt;
use sdk::envelope::{Capability, Envelope, EnvelopeError};
use sdk::types::CapabilityRequest;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DispatchConfig;

/// Dispatches capability calls to registered providers
pub struct CapabilityDispatcher {
    /// Providers per capability, in failover order
    providers: HashMap<Capability, Vec<Arc<dyn CapabilityProvider>>>,

    cache: Arc<dyn EnvelopeCache>,

    /// Per-call provider timeout
    timeout: Duration,
}

impl CapabilityDispatcher {
    pub fn new(cache: Arc<dyn EnvelopeCache>, timeout: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            cache,
            timeout,
        }
    }

    /// Dispatcher with an in-memory cache sized from config
    pub fn from_config(config: &DispatchConfig) -> Self {
        let cache = MemoryEnvelopeCache::new(config.cache_ttl(), config.cache_capacity);
        Self::new(Arc::new(cache), config.provider_timeout())
    }

    /// Bind a provider to every capability it serves
    ///
    /// Providers registered earlier are tried first.
    pub fn register(&mut self, provider: Arc<dyn CapabilityProvider>) {
        for capability in provider.capabilities() {
            tracing::debug!("Binding provider {} to {}", provider.name(), capability);
            self.providers
                .entry(*capability)
                .or_default()
                .push(Arc::clone(&provider));
        }
    }

    /// Whether any provider serves the capability
    pub fn is_bound(&self, capability: Capability) -> bool {
        self.providers
            .get(&capability)
            .is_some_and(|providers| !providers.is_empty())
    }

    /// Call a capability with a structured input
    pub async fn call(&self, capability: Capability, input: &Value) -> Envelope {
        let key = cache_key(capability, input);
        if let Some(envelope) = self.cache.get(&key) {
            tracing::debug!("Cache hit for {}", capability);
            return envelope;
        }

        let request = match CapabilityRequest::parse(capability, input) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Rejected {} input: {}", capability, e);
                return Envelope::failure(EnvelopeError::new(
                    "invalid_input",
                    "The search request is missing required details",
                    false,
                ));
            }
        };

        let providers = match self.providers.get(&capability) {
            Some(providers) if !providers.is_empty() => providers.as_slice(),
            _ => {
                tracing::warn!("No provider bound for {}", capability);
                return Envelope::failure(ProviderError::Unsupported(capability).to_envelope_error());
            }
        };

        let result = if capability == Capability::HotelSearch {
            self.call_with_retry(providers, &request).await
        } else {
            self.call_with_failover(providers, &request).await
        };

        match result {
            Ok(response) => {
                let envelope = Envelope::success(response.data, response.snippets);
                self.cache.insert(key, envelope.clone());
                envelope
            }
            Err(Degraded::SoftEmpty) => Envelope::soft_empty(capability),
            Err(Degraded::Failed(e)) => Envelope::failure(e.to_envelope_error()),
        }
    }

    /// Try providers in order; stop at the first non-retryable failure
    async fn call_with_failover(
        &self,
        providers: &[Arc<dyn CapabilityProvider>],
        request: &CapabilityRequest,
    ) -> Result<ProviderResponse, Degraded> {
        let mut last_error = ProviderError::Unsupported(request.capability());

        for provider in providers {
            match self.invoke(provider.as_ref(), request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => last_error = e,
                Err(e) => return Err(Degraded::Failed(e)),
            }
        }

        tracing::error!("All providers failed for {}", request.capability());
        Err(Degraded::Failed(last_error))
    }

    /// One retry on the secondary provider (or the same one if only one is bound)
    async fn call_with_retry(
        &self,
        providers: &[Arc<dyn CapabilityProvider>],
        request: &CapabilityRequest,
    ) -> Result<ProviderResponse, Degraded> {
        let Some(primary) = providers.first() else {
            return Err(Degraded::Failed(ProviderError::Unsupported(request.capability())));
        };

        match self.invoke(primary.as_ref(), request).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_retryable() => {
                let secondary = providers.get(1).unwrap_or(primary);
                tracing::info!("Retrying {} with {}", request.capability(), secondary.name());

                match self.invoke(secondary.as_ref(), request).await {
                    Ok(response) => Ok(response),
                    Err(retry_error) => {
                        tracing::warn!(
                            "Retry failed for {} ({}), returning empty results",
                            request.capability(),
                            retry_error.code()
                        );
                        Err(Degraded::SoftEmpty)
                    }
                }
            }
            Err(e) => Err(Degraded::Failed(e)),
        }
    }

    /// Single provider call under timeout, with panics caught
    async fn invoke(
        &self,
        provider: &dyn CapabilityProvider,
        request: &CapabilityRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        tracing::debug!(
            "Attempting provider: {} (timeout: {}s)",
            provider.name(),
            self.timeout.as_secs()
        );

        let call = AssertUnwindSafe(provider.search(request)).catch_unwind();
        let result = tokio::time::timeout(self.timeout, call).await;

        match result {
            Ok(Ok(Ok(response))) => {
                if response.data.capability() != request.capability() {
                    tracing::warn!(
                        "Provider {} returned {} data for {}",
                        provider.name(),
                        response.data.capability(),
                        request.capability()
                    );
                    return Err(ProviderError::InvalidResponse(
                        "result shape does not match capability".to_string(),
                    ));
                }
                tracing::debug!("Provider {} succeeded", provider.name());
                Ok(response)
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!("Provider {} failed: {}", provider.name(), e);
                Err(e)
            }
            Ok(Err(_)) => {
                tracing::error!("Provider {} panicked", provider.name());
                Err(ProviderError::Internal("provider panicked".to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    "Provider {} timed out after {}s",
                    provider.name(),
                    self.timeout.as_secs()
                );
                Err(ProviderError::Timeout)
            }
        }
    }
}

/// Outcome of a failed provider round
enum Degraded {
    SoftEmpty,
    Failed(ProviderError),
}
