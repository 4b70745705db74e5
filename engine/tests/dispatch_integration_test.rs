//! Integration tests for capability dispatch
//!
//! Exercises the dispatcher through its public API: response caching with
//! a real TTL, hotel soft-empty degradation and failover between providers.

use async_trait::async_trait;
use sdk::envelope::{Capability, EnvelopeData};
use sdk::types::{CapabilityRequest, Hotel, Product};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wayfind_engine::dispatch::{
    cache_key, CapabilityDispatcher, CapabilityProvider, MemoryEnvelopeCache, ProviderError,
    ProviderResponse,
};

#[derive(Clone, Copy)]
enum Mode {
    Ok,
    Timeout,
    RateLimited,
    Upstream,
}

struct CountingProvider {
    name: &'static str,
    mode: Mode,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new(name: &'static str, mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            name,
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityProvider for CountingProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::ProductSearch, Capability::HotelSearch]
    }

    async fn search(&self, request: &CapabilityRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Timeout => return Err(ProviderError::Timeout),
            Mode::RateLimited => return Err(ProviderError::RateLimited),
            Mode::Upstream => return Err(ProviderError::Upstream(500)),
            Mode::Ok => {}
        }

        let data = match request {
            CapabilityRequest::Hotel(input) => EnvelopeData::Hotels(vec![Hotel {
                id: "h1".to_string(),
                name: format!("{} hotel", self.name),
                city: Some(input.destination.clone()),
                ..Default::default()
            }]),
            _ => EnvelopeData::Products(vec![Product {
                id: "p1".to_string(),
                title: format!("{} product", self.name),
                ..Default::default()
            }]),
        };
        Ok(ProviderResponse::new(data))
    }
}

fn dispatcher(ttl: Duration, providers: &[Arc<CountingProvider>]) -> CapabilityDispatcher {
    let cache = Arc::new(MemoryEnvelopeCache::new(ttl, 1_000));
    let mut dispatcher = CapabilityDispatcher::new(cache, Duration::from_secs(2));
    for provider in providers {
        dispatcher.register(Arc::clone(provider) as Arc<dyn CapabilityProvider>);
    }
    dispatcher
}

#[tokio::test]
async fn test_cache_hit_within_ttl_and_miss_after() {
    let provider = CountingProvider::new("primary", Mode::Ok);
    let dispatcher = dispatcher(Duration::from_millis(300), &[Arc::clone(&provider)]);
    let input = json!({"query": "trail running shoes"});

    let first = dispatcher.call(Capability::ProductSearch, &input).await;
    let second = dispatcher.call(Capability::ProductSearch, &input).await;
    assert!(first.ok);
    assert_eq!(first, second);
    assert_eq!(provider.calls(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;

    let third = dispatcher.call(Capability::ProductSearch, &input).await;
    assert!(third.ok);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_equivalent_inputs_share_cache_entry() {
    let provider = CountingProvider::new("primary", Mode::Ok);
    let dispatcher = dispatcher(Duration::from_secs(60), &[Arc::clone(&provider)]);

    let a = json!({"query": "desk lamp", "maxPrice": 40});
    let b = json!({"maxPrice": 40, "query": "desk lamp"});
    assert_eq!(
        cache_key(Capability::ProductSearch, &a),
        cache_key(Capability::ProductSearch, &b)
    );

    dispatcher.call(Capability::ProductSearch, &a).await;
    dispatcher.call(Capability::ProductSearch, &b).await;
    assert_eq!(provider.calls(), 1);

    // Same input, different capability
    assert_ne!(
        cache_key(Capability::ProductSearch, &a),
        cache_key(Capability::HotelSearch, &a)
    );
}

#[tokio::test]
async fn test_hotel_double_failure_is_soft_empty() {
    let provider = CountingProvider::new("primary", Mode::Timeout);
    let dispatcher = dispatcher(Duration::from_secs(60), &[Arc::clone(&provider)]);

    let envelope = dispatcher
        .call(Capability::HotelSearch, &json!({"destination": "Austin"}))
        .await;

    assert!(envelope.ok);
    assert!(envelope.error.is_none());
    assert_eq!(envelope.data, Some(EnvelopeData::Hotels(vec![])));
    assert!(envelope.is_well_formed());
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_hotel_retry_reaches_secondary() {
    let primary = CountingProvider::new("primary", Mode::Timeout);
    let secondary = CountingProvider::new("secondary", Mode::Ok);
    let dispatcher = dispatcher(
        Duration::from_secs(60),
        &[Arc::clone(&primary), Arc::clone(&secondary)],
    );

    let envelope = dispatcher
        .call(Capability::HotelSearch, &json!({"destination": "Austin"}))
        .await;

    match envelope.data {
        Some(EnvelopeData::Hotels(hotels)) => assert_eq!(hotels[0].name, "secondary hotel"),
        other => panic!("expected hotels, got {:?}", other),
    }
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test]
async fn test_rate_limit_is_a_final_error() {
    let primary = CountingProvider::new("primary", Mode::RateLimited);
    let secondary = CountingProvider::new("secondary", Mode::Ok);
    let dispatcher = dispatcher(
        Duration::from_secs(60),
        &[Arc::clone(&primary), Arc::clone(&secondary)],
    );

    let hotels = dispatcher
        .call(Capability::HotelSearch, &json!({"destination": "Austin"}))
        .await;
    assert!(!hotels.ok);
    assert!(hotels.is_well_formed());
    let error = hotels.error.unwrap();
    assert_eq!(error.code, "rate_limited");
    assert!(!error.retryable);

    let products = dispatcher
        .call(Capability::ProductSearch, &json!({"query": "tent"}))
        .await;
    assert!(!products.ok);
    assert!(!products.error.unwrap().retryable);

    // Neither call moved on to the secondary
    assert_eq!(primary.calls(), 2);
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn test_product_failover_and_final_error() {
    let primary = CountingProvider::new("primary", Mode::Timeout);
    let secondary = CountingProvider::new("secondary", Mode::Ok);
    let dispatcher = dispatcher(
        Duration::from_secs(60),
        &[Arc::clone(&primary), Arc::clone(&secondary)],
    );
    let envelope = dispatcher
        .call(Capability::ProductSearch, &json!({"query": "tent"}))
        .await;
    assert!(envelope.ok);

    let only = CountingProvider::new("only", Mode::Upstream);
    let dispatcher = dispatcher_with(&only);
    let envelope = dispatcher
        .call(Capability::ProductSearch, &json!({"query": "tent"}))
        .await;
    assert!(!envelope.ok);
    assert!(envelope.is_well_formed());
    let error = envelope.error.unwrap();
    assert_eq!(error.code, "provider_error");
    assert!(!error.retryable);
    // Provider details never reach the caller
    assert!(!error.message.contains("500"));
}

fn dispatcher_with(provider: &Arc<CountingProvider>) -> CapabilityDispatcher {
    dispatcher(Duration::from_secs(60), &[Arc::clone(provider)])
}

#[tokio::test]
async fn test_unbound_and_invalid_inputs() {
    let provider = CountingProvider::new("primary", Mode::Ok);
    let dispatcher = dispatcher_with(&provider);

    let unbound = dispatcher
        .call(Capability::FlightSearch, &json!({"destination": "Austin"}))
        .await;
    assert!(!unbound.ok);
    assert_eq!(unbound.error.unwrap().code, "capability_unavailable");

    let invalid = dispatcher
        .call(Capability::HotelSearch, &json!({"guests": 2}))
        .await;
    assert!(!invalid.ok);
    assert_eq!(invalid.error.unwrap().code, "invalid_input");
    assert_eq!(provider.calls(), 0);
}
