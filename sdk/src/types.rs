//! Domain items and capability inputs

use serde::{Deserialize, Serialize};

use crate::envelope::Capability;
use crate::errors::EngineError;

/// Catalog product listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Display price as returned by the provider (e.g. "$89.99")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Merchant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Promotional tag (e.g. "18% OFF")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<u64>,
}

/// Lodging listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Display price (e.g. "$299/night")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_per_night: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amenities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Flight offer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: String,
    pub airline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_number: Option<String>,
    pub origin: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub stops: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Movie showtime at a theater
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: String,
    pub movie: String,
    pub theater: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    /// Screening format (e.g. "IMAX", "3D")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Weather forecast for one location and day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Short condition label (e.g. "sunny", "light rain")
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_c: Option<f64>,
    /// Chance of precipitation in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation_chance: Option<f64>,
}

impl WeatherReport {
    /// Whether the reported condition satisfies a condition word
    ///
    /// Synonyms are grouped so that "sunny" also matches "clear", and
    /// "rain" matches "showers" or "drizzle".
    pub fn matches_condition(&self, wanted: &str) -> bool {
        const GROUPS: &[&[&str]] = &[
            &["sunny", "sun", "clear", "fair"],
            &["rain", "rainy", "showers", "drizzle", "storm", "thunderstorm"],
            &["snow", "snowy", "sleet", "flurries"],
            &["cloudy", "clouds", "overcast"],
            &["warm", "hot"],
            &["cold", "freezing", "chilly"],
        ];

        let wanted = wanted.trim().to_lowercase();
        let condition = self.condition.to_lowercase();
        if wanted.is_empty() {
            return false;
        }
        if condition.contains(&wanted) {
            return true;
        }

        GROUPS
            .iter()
            .filter(|group| group.contains(&wanted.as_str()))
            .any(|group| group.iter().any(|word| condition.contains(word)))
    }
}

/// Input for `product_search`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSearchInput {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "min_price")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "max_price")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// Input for `hotel_search`
///
/// Only `destination` is required; providers fill default dates and a
/// single guest when those are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelSearchInput {
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "check_in")]
    pub check_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "check_out")]
    pub check_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guests: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "max_price")]
    pub max_price: Option<f64>,
}

/// Input for `flight_search`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightSearchInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "depart_date")]
    pub depart_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "return_date")]
    pub return_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passengers: Option<u32>,
}

/// Input for `movie_search`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieSearchInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Input for `weather_search`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSearchInput {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Typed capability request handed to providers
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityRequest {
    Product(ProductSearchInput),
    Hotel(HotelSearchInput),
    Flight(FlightSearchInput),
    Movie(MovieSearchInput),
    Weather(WeatherSearchInput),
}

impl CapabilityRequest {
    /// Parse a structured JSON input against the capability's schema
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` when required fields are missing
    /// or have the wrong type.
    pub fn parse(capability: Capability, input: &serde_json::Value) -> Result<Self, EngineError> {
        fn decode<T: serde::de::DeserializeOwned>(
            capability: Capability,
            input: &serde_json::Value,
        ) -> Result<T, EngineError> {
            T::deserialize(input).map_err(|e| EngineError::InvalidInput {
                capability: capability.to_string(),
                reason: e.to_string(),
            })
        }

        let request = match capability {
            Capability::ProductSearch => Self::Product(decode(capability, input)?),
            Capability::HotelSearch => Self::Hotel(decode(capability, input)?),
            Capability::FlightSearch => Self::Flight(decode(capability, input)?),
            Capability::MovieSearch => Self::Movie(decode(capability, input)?),
            Capability::WeatherSearch => Self::Weather(decode(capability, input)?),
        };
        Ok(request)
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::Product(_) => Capability::ProductSearch,
            Self::Hotel(_) => Capability::HotelSearch,
            Self::Flight(_) => Capability::FlightSearch,
            Self::Movie(_) => Capability::MovieSearch,
            Self::Weather(_) => Capability::WeatherSearch,
        }
    }

    /// Free-text form of the request, used as the ranking query
    pub fn search_text(&self) -> String {
        let parts: Vec<&str> = match self {
            Self::Product(p) => vec![
                Some(p.query.as_str()),
                p.brand.as_deref(),
                p.category.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect(),
            Self::Hotel(h) => match &h.query {
                Some(q) => vec![q.as_str(), h.destination.as_str()],
                None => vec!["hotels in", h.destination.as_str()],
            },
            Self::Flight(f) => match &f.origin {
                Some(origin) => vec!["flights from", origin.as_str(), "to", f.destination.as_str()],
                None => vec!["flights to", f.destination.as_str()],
            },
            Self::Movie(m) => match &m.title {
                Some(title) => vec![title.as_str(), "showtimes in", m.location.as_str()],
                None => vec!["movie showtimes in", m.location.as_str()],
            },
            Self::Weather(w) => vec!["weather in", w.location.as_str()],
        };
        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hotel_input_camel_case() {
        let input = json!({
            "destination": "Austin",
            "checkIn": "2026-11-01",
            "checkOut": "2026-11-03",
            "guests": 2
        });
        let request = CapabilityRequest::parse(Capability::HotelSearch, &input).unwrap();
        match request {
            CapabilityRequest::Hotel(h) => {
                assert_eq!(h.destination, "Austin");
                assert_eq!(h.check_in.as_deref(), Some("2026-11-01"));
                assert_eq!(h.guests, Some(2));
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_missing_required_field() {
        let input = json!({ "checkIn": "2026-11-01" });
        let err = CapabilityRequest::parse(Capability::HotelSearch, &input).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn test_search_text() {
        let request = CapabilityRequest::Product(ProductSearchInput {
            query: "running shoes".to_string(),
            brand: Some("Nike".to_string()),
            ..Default::default()
        });
        assert_eq!(request.search_text(), "running shoes Nike");

        let request = CapabilityRequest::Weather(WeatherSearchInput {
            location: "Denver".to_string(),
            date: None,
        });
        assert_eq!(request.search_text(), "weather in Denver");
    }

    #[test]
    fn test_weather_condition_synonyms() {
        let report = WeatherReport {
            location: "Denver".to_string(),
            condition: "Clear skies".to_string(),
            ..Default::default()
        };
        assert!(report.matches_condition("sunny"));
        assert!(report.matches_condition("clear"));
        assert!(!report.matches_condition("rain"));
        assert!(!report.matches_condition(""));
    }
}
