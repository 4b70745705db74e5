//! Capability providers backed by external search APIs

pub mod serpapi;

pub use serpapi::SerpApiProvider;
