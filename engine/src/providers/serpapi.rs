//! SerpAPI provider
//!
//! Serves `product_search` through the `google_shopping` engine and
//! `hotel_search` through `google_hotels`. Results are mapped field by field
//! into the shared item types; the raw provider body is never forwarded.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use sdk::envelope::{Capability, EnvelopeData, Snippet};
use sdk::types::{CapabilityRequest, Hotel, HotelSearchInput, Product, ProductSearchInput};
use serde_json::Value;
use std::time::Duration;

use crate::config::SerpApiConfig;
use crate::dispatch::{CapabilityProvider, ProviderError, ProviderResponse};

const CAPABILITIES: [Capability; 2] = [Capability::ProductSearch, Capability::HotelSearch];

fn build_client(timeout: Duration) -> Option<Client> {
    match Client::builder().timeout(timeout).build() {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::error!("Failed to build SerpAPI HTTP client: {}", e);
            None
        }
    }
}

/// SerpAPI client for shopping and hotel search
#[derive(Debug, Clone)]
pub struct SerpApiProvider {
    endpoint: String,

    /// Read from the environment; `None` when the variable is unset
    api_key: Option<String>,

    language: String,
    country: String,

    /// `None` when the HTTP client could not be built
    client: Option<Client>,
}

impl SerpApiProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        language: impl Into<String>,
        country: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            language: language.into(),
            country: country.into(),
            client: build_client(timeout),
        }
    }

    /// Build from config, reading the API key from `api_key_env`
    pub fn from_config(config: &SerpApiConfig, timeout: Duration) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                "{} is not set; SerpAPI searches will fail until it is",
                config.api_key_env
            );
        }
        Self::new(
            &config.endpoint,
            api_key,
            &config.language,
            &config.country,
            timeout,
        )
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<Value, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("SerpAPI key not configured".to_string()))?;

        let client = self.client.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured("SerpAPI HTTP client unavailable".to_string())
        })?;

        let mut query: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        query.push(("hl", &self.language));
        query.push(("gl", &self.country));
        query.push(("api_key", api_key));

        let response = client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(map_send_error)?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited),
            status => {
                tracing::warn!("SerpAPI returned HTTP {}", status.as_u16());
                return Err(ProviderError::Upstream(status.as_u16()));
            }
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("body is not JSON: {}", e)))?;

        // SerpAPI reports some failures as 200 with an `error` field
        if payload.get("error").is_some() {
            return Err(ProviderError::Upstream(200));
        }

        Ok(payload)
    }

    async fn search_products(
        &self,
        input: &ProductSearchInput,
    ) -> Result<ProviderResponse, ProviderError> {
        let lowered = input.query.to_lowercase();
        let mut parts: Vec<&str> = [input.gender.as_deref(), input.brand.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !lowered.contains(&part.to_lowercase()))
            .collect();
        parts.push(&input.query);
        let query = parts.join(" ");

        let payload = self
            .fetch(&[("engine", "google_shopping".to_string()), ("q", query)])
            .await?;

        let products: Vec<Product> = results_array(&payload, "shopping_results")
            .iter()
            .filter_map(map_product)
            .filter(|p| within_price(p.extracted_price, input.min_price, input.max_price))
            .collect();

        tracing::debug!("SerpAPI shopping returned {} products", products.len());

        let snippets = products
            .iter()
            .map(|p| {
                let excerpt = [p.source.as_deref(), p.price.as_deref(), p.delivery.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" · ");
                Snippet::new(&p.id, &p.title, p.link.clone(), &excerpt, 0.0)
            })
            .collect();

        Ok(ProviderResponse {
            data: EnvelopeData::Products(products),
            snippets,
        })
    }

    async fn search_hotels(&self, input: &HotelSearchInput) -> Result<ProviderResponse, ProviderError> {
        let today = Utc::now().date_naive();
        let check_in = input
            .check_in
            .clone()
            .unwrap_or_else(|| (today + ChronoDuration::days(1)).format("%Y-%m-%d").to_string());
        let check_out = input
            .check_out
            .clone()
            .unwrap_or_else(|| (today + ChronoDuration::days(2)).format("%Y-%m-%d").to_string());

        let query = match &input.query {
            Some(q) if q.to_lowercase().contains(&input.destination.to_lowercase()) => q.clone(),
            Some(q) => format!("{} {}", q, input.destination),
            None => format!("hotels in {}", input.destination),
        };

        let mut params = vec![
            ("engine", "google_hotels".to_string()),
            ("q", query),
            ("check_in_date", check_in),
            ("check_out_date", check_out),
            ("adults", input.guests.unwrap_or(1).max(1).to_string()),
        ];
        if let Some(max_price) = input.max_price {
            params.push(("max_price", format!("{}", max_price.round() as u64)));
        }

        let payload = self.fetch(&params).await?;

        let hotels: Vec<Hotel> = results_array(&payload, "properties")
            .iter()
            .filter_map(|item| map_hotel(item, &input.destination))
            .collect();

        tracing::debug!("SerpAPI hotels returned {} properties", hotels.len());

        let snippets = hotels
            .iter()
            .map(|h| {
                let excerpt = h
                    .description
                    .as_deref()
                    .or(h.address.as_deref())
                    .unwrap_or_default();
                Snippet::new(&h.id, &h.name, h.link.clone(), excerpt, 0.0)
            })
            .collect();

        Ok(ProviderResponse {
            data: EnvelopeData::Hotels(hotels),
            snippets,
        })
    }
}

#[async_trait]
impl CapabilityProvider for SerpApiProvider {
    fn name(&self) -> &str {
        "serpapi"
    }

    fn capabilities(&self) -> &[Capability] {
        &CAPABILITIES
    }

    async fn search(&self, request: &CapabilityRequest) -> Result<ProviderResponse, ProviderError> {
        match request {
            CapabilityRequest::Product(input) => self.search_products(input).await,
            CapabilityRequest::Hotel(input) => self.search_hotels(input).await,
            other => Err(ProviderError::Unsupported(other.capability())),
        }
    }
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    // reqwest errors may carry the request URL, which includes the API key
    let e = e.without_url();
    if e.is_timeout() {
        ProviderError::Timeout
    } else if e.is_connect() {
        ProviderError::Connection(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

fn results_array<'a>(payload: &'a Value, field: &str) -> &'a [Value] {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn text(item: &Value, field: &str) -> Option<String> {
    item.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numeric field that may arrive as a number or a string like "2,847"
fn number(item: &Value, field: &str) -> Option<f64> {
    match item.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace([',', '$'], "").trim().parse().ok(),
        _ => None,
    }
}

fn stable_id(prefix: &str, parts: &[Option<&str>]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts.iter().flatten() {
        hasher.update(part.as_bytes());
        hasher.update(b"\x1f");
    }
    let hex = hasher.finalize().to_hex();
    format!("{}-{}", prefix, &hex.as_str()[..16])
}

fn map_product(item: &Value) -> Option<Product> {
    let title = text(item, "title")?;
    let link = text(item, "link").or_else(|| text(item, "product_link"));
    let id = text(item, "product_id")
        .map(|id| format!("product-{}", id))
        .unwrap_or_else(|| stable_id("product", &[Some(&title), link.as_deref()]));

    Some(Product {
        id,
        title,
        description: text(item, "snippet"),
        brand: None,
        category: None,
        price: text(item, "price"),
        extracted_price: number(item, "extracted_price"),
        old_price: number(item, "extracted_price_old"),
        link,
        source: text(item, "source"),
        thumbnail: text(item, "thumbnail"),
        tag: text(item, "tag"),
        delivery: text(item, "delivery"),
        rating: number(item, "rating"),
        reviews: number(item, "reviews").map(|r| r as u64),
    })
}

fn map_hotel(item: &Value, destination: &str) -> Option<Hotel> {
    let name = text(item, "name")?;
    let rate = item.get("rate_per_night");
    let price = text(item, "price").or_else(|| rate.and_then(|r| text(r, "lowest")));
    let rate_per_night = rate
        .and_then(|r| number(r, "extracted_lowest"))
        .or_else(|| price.as_deref().and_then(parse_leading_amount));

    let city = item
        .get("location")
        .and_then(|l| text(l, "city"))
        .or_else(|| Some(destination.to_string()));

    let thumbnail = text(item, "thumbnail").or_else(|| {
        item.get("images")
            .and_then(Value::as_array)
            .and_then(|images| images.first())
            .and_then(|image| text(image, "thumbnail"))
    });

    let amenities = item
        .get("amenities")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let address = text(item, "address");
    let id = text(item, "property_token")
        .map(|token| format!("hotel-{}", token))
        .unwrap_or_else(|| stable_id("hotel", &[Some(&name), address.as_deref()]));

    Some(Hotel {
        id,
        name,
        address,
        city,
        description: text(item, "description"),
        price,
        rate_per_night,
        rating: number(item, "overall_rating").or_else(|| number(item, "rating")),
        reviews: number(item, "reviews").map(|r| r as u64),
        amenities,
        thumbnail,
        link: text(item, "link"),
    })
}

/// First number in a display price such as "$299/night"
fn parse_leading_amount(display: &str) -> Option<f64> {
    let digits: String = display
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    digits.parse().ok()
}

fn within_price(price: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    let Some(price) = price else {
        return true;
    };
    min.map_or(true, |min| price >= min) && max.map_or(true, |max| price <= max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_product_fields() {
        let item = json!({
            "title": "Nike Pegasus 41",
            "price": "$89.99",
            "extracted_price": 89.99,
            "extracted_price_old": 110.0,
            "product_link": "https://example.com/pegasus",
            "source": "Nike",
            "tag": "18% OFF",
            "delivery": "Free delivery by Mon",
            "rating": "4.5",
            "reviews": "1,204"
        });

        let product = map_product(&item).unwrap();
        assert_eq!(product.title, "Nike Pegasus 41");
        assert_eq!(product.link.as_deref(), Some("https://example.com/pegasus"));
        assert_eq!(product.extracted_price, Some(89.99));
        assert_eq!(product.old_price, Some(110.0));
        assert_eq!(product.rating, Some(4.5));
        assert_eq!(product.reviews, Some(1204));
        assert!(product.id.starts_with("product-"));
    }

    #[test]
    fn test_map_product_requires_title() {
        assert!(map_product(&json!({"price": "$10"})).is_none());
    }

    #[test]
    fn test_product_id_is_stable() {
        let item = json!({"title": "Trail Runner", "link": "https://example.com/t"});
        assert_eq!(map_product(&item).unwrap().id, map_product(&item).unwrap().id);
    }

    #[test]
    fn test_map_hotel_fields() {
        let item = json!({
            "name": "Grand Plaza Hotel",
            "address": "123 Broadway, New York, NY 10001",
            "price": "$299/night",
            "rating": "4.5",
            "reviews": "2,847",
            "thumbnail": "https://example.com/hotel.jpg",
            "link": "https://grandplazahotel.com",
            "amenities": ["Free WiFi", "Pool"],
            "location": {"city": "New York", "state": "NY"},
            "description": "Luxury hotel in Manhattan."
        });

        let hotel = map_hotel(&item, "NYC").unwrap();
        assert_eq!(hotel.name, "Grand Plaza Hotel");
        assert_eq!(hotel.city.as_deref(), Some("New York"));
        assert_eq!(hotel.rate_per_night, Some(299.0));
        assert_eq!(hotel.reviews, Some(2847));
        assert_eq!(hotel.amenities, vec!["Free WiFi", "Pool"]);
    }

    #[test]
    fn test_map_hotel_serpapi_shape() {
        let item = json!({
            "name": "Hotel Van Zandt",
            "rate_per_night": {"lowest": "$245", "extracted_lowest": 245},
            "overall_rating": 4.6,
            "reviews": 1830,
            "images": [{"thumbnail": "https://example.com/vz.jpg"}],
            "property_token": "abc123"
        });

        let hotel = map_hotel(&item, "Austin").unwrap();
        assert_eq!(hotel.id, "hotel-abc123");
        assert_eq!(hotel.price.as_deref(), Some("$245"));
        assert_eq!(hotel.rate_per_night, Some(245.0));
        assert_eq!(hotel.rating, Some(4.6));
        assert_eq!(hotel.city.as_deref(), Some("Austin"));
        assert_eq!(hotel.thumbnail.as_deref(), Some("https://example.com/vz.jpg"));
    }

    #[test]
    fn test_price_window() {
        assert!(within_price(None, Some(10.0), Some(20.0)));
        assert!(within_price(Some(15.0), Some(10.0), Some(20.0)));
        assert!(!within_price(Some(25.0), None, Some(20.0)));
        assert!(!within_price(Some(5.0), Some(10.0), None));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let provider = SerpApiProvider::new(
            "http://127.0.0.1:9/search.json",
            None,
            "en",
            "us",
            Duration::from_secs(1),
        );
        let request = CapabilityRequest::Product(ProductSearchInput {
            query: "shoes".to_string(),
            ..Default::default()
        });

        let err = provider.search(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_client_is_not_configured() {
        let mut provider = SerpApiProvider::new(
            "http://127.0.0.1:9/search.json",
            Some("k".into()),
            "en",
            "us",
            Duration::from_secs(1),
        );
        assert!(provider.client.is_some());
        provider.client = None;

        let request = CapabilityRequest::Product(ProductSearchInput {
            query: "shoes".to_string(),
            ..Default::default()
        });
        let err = provider.search(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unsupported_capability() {
        let provider = SerpApiProvider::new(
            "http://127.0.0.1:9",
            Some("k".into()),
            "en",
            "us",
            Duration::from_secs(1),
        );
        let request =
            CapabilityRequest::parse(Capability::WeatherSearch, &json!({"location": "Denver"}))
                .unwrap();
        let err = provider.search(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(Capability::WeatherSearch)));
    }
}
