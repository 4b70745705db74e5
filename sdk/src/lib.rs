//! Wayfind SDK
//!
//! Shared contract types for the Wayfind engine and its capability providers.
//! Providers only need this crate to implement a search capability.

/// Error types and handling
pub mod errors;

/// Capability envelope types
pub mod envelope;

/// Domain items and capability inputs
pub mod types;

// Re-export commonly used types
pub use envelope::{Capability, Envelope, EnvelopeData, EnvelopeError, Snippet};
pub use errors::{EngineError, WayfindErrorExt};
pub use types::{
    CapabilityRequest, Flight, FlightSearchInput, Hotel, HotelSearchInput, MovieSearchInput,
    Product, ProductSearchInput, Showtime, WeatherReport, WeatherSearchInput,
};
