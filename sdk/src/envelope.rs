//! Capability envelope types
//!
//! Every capability call returns an [`Envelope`]: either a success carrying
//! exactly one kind of result data, or a failure carrying a classified error.
//! The constructors are the only way the engine builds envelopes, which keeps
//! the `ok`/`data`/`error` invariant intact.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;
use crate::types::{Flight, Hotel, Product, Showtime, WeatherReport};

/// Maximum number of snippets carried by one envelope
pub const MAX_SNIPPETS: usize = 20;

/// Maximum excerpt length in characters
pub const MAX_EXCERPT_CHARS: usize = 300;

/// Named search capability with a fixed input/output contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ProductSearch,
    HotelSearch,
    FlightSearch,
    MovieSearch,
    WeatherSearch,
}

impl Capability {
    /// All capabilities in declaration order
    pub const ALL: [Capability; 5] = [
        Capability::ProductSearch,
        Capability::HotelSearch,
        Capability::FlightSearch,
        Capability::MovieSearch,
        Capability::WeatherSearch,
    ];

    /// Wire name of the capability (e.g. `hotel_search`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ProductSearch => "product_search",
            Capability::HotelSearch => "hotel_search",
            Capability::FlightSearch => "flight_search",
            Capability::MovieSearch => "movie_search",
            Capability::WeatherSearch => "weather_search",
        }
    }

    /// Look up a capability by wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name.trim())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| EngineError::UnknownCapability(s.to_string()))
    }
}

/// Result data of a successful capability call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum EnvelopeData {
    Products(Vec<Product>),
    Hotels(Vec<Hotel>),
    Flights(Vec<Flight>),
    Showtimes(Vec<Showtime>),
    Weather(WeatherReport),
}

impl EnvelopeData {
    /// Empty result list for a list-shaped capability
    ///
    /// Weather has no empty form and returns `None`.
    pub fn empty_for(capability: Capability) -> Option<Self> {
        match capability {
            Capability::ProductSearch => Some(Self::Products(Vec::new())),
            Capability::HotelSearch => Some(Self::Hotels(Vec::new())),
            Capability::FlightSearch => Some(Self::Flights(Vec::new())),
            Capability::MovieSearch => Some(Self::Showtimes(Vec::new())),
            Capability::WeatherSearch => None,
        }
    }

    /// Capability this data shape belongs to
    pub fn capability(&self) -> Capability {
        match self {
            Self::Products(_) => Capability::ProductSearch,
            Self::Hotels(_) => Capability::HotelSearch,
            Self::Flights(_) => Capability::FlightSearch,
            Self::Showtimes(_) => Capability::MovieSearch,
            Self::Weather(_) => Capability::WeatherSearch,
        }
    }

    /// Number of result items (a weather report counts as one)
    pub fn len(&self) -> usize {
        match self {
            Self::Products(items) => items.len(),
            Self::Hotels(items) => items.len(),
            Self::Flights(items) => items.len(),
            Self::Showtimes(items) => items.len(),
            Self::Weather(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append another result set of the same shape
    ///
    /// Returns `false` and leaves `self` untouched when the shapes differ.
    /// A second weather report replaces nothing and is ignored.
    pub fn merge(&mut self, other: EnvelopeData) -> bool {
        match (self, other) {
            (Self::Products(a), Self::Products(b)) => a.extend(b),
            (Self::Hotels(a), Self::Hotels(b)) => a.extend(b),
            (Self::Flights(a), Self::Flights(b)) => a.extend(b),
            (Self::Showtimes(a), Self::Showtimes(b)) => a.extend(b),
            (Self::Weather(_), Self::Weather(_)) => {}
            _ => return false,
        }
        true
    }
}

/// Classified error carried by a failed envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    /// Stable machine-readable code (e.g. `timeout`, `provider_error`)
    pub code: String,

    /// User-safe message, never a raw provider body
    pub message: String,

    /// Whether retrying the call may succeed
    pub retryable: bool,
}

impl EnvelopeError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }
}

/// Evidence snippet used for citation by the answer stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub excerpt: String,
    pub score: f64,
}

impl Snippet {
    /// Create a snippet, truncating the excerpt to [`MAX_EXCERPT_CHARS`]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: Option<String>,
        excerpt: &str,
        score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url,
            excerpt: truncate_chars(excerpt, MAX_EXCERPT_CHARS),
            score,
        }
    }
}

/// Truncate to at most `max` characters on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Uniform result of any capability call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<EnvelopeData>,

    #[serde(default)]
    pub snippets: Vec<Snippet>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl Envelope {
    /// Successful envelope; snippets are bounded to [`MAX_SNIPPETS`]
    pub fn success(data: EnvelopeData, mut snippets: Vec<Snippet>) -> Self {
        snippets.truncate(MAX_SNIPPETS);
        Self {
            ok: true,
            data: Some(data),
            snippets,
            error: None,
        }
    }

    /// Failed envelope
    pub fn failure(error: EnvelopeError) -> Self {
        Self {
            ok: false,
            data: None,
            snippets: Vec::new(),
            error: Some(error),
        }
    }

    /// Successful envelope with an empty result list
    ///
    /// Falls back to a non-retryable failure for capabilities without an
    /// empty form (weather).
    pub fn soft_empty(capability: Capability) -> Self {
        match EnvelopeData::empty_for(capability) {
            Some(data) => Self::success(data, Vec::new()),
            None => Self::failure(EnvelopeError::new(
                "no_results",
                format!("{} returned no results", capability),
                false,
            )),
        }
    }

    /// Check the `ok`/`data`/`error` invariant
    pub fn is_well_formed(&self) -> bool {
        if self.ok {
            self.data.is_some() && self.error.is_none()
        } else {
            self.data.is_none() && self.error.is_some()
        }
    }

    /// Whether this envelope is a failure that may succeed on retry
    pub fn is_retryable_failure(&self) -> bool {
        self.error.as_ref().map(|e| e.retryable).unwrap_or(false)
    }

    /// Number of result items (zero on failure)
    pub fn item_count(&self) -> usize {
        self.data.as_ref().map(EnvelopeData::len).unwrap_or(0)
    }
}
