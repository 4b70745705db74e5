//! Error types and handling
//!
//! This module provides the error types that cross component boundaries in the
//! Wayfind engine. All errors implement the `WayfindErrorExt` trait which
//! provides user-friendly hints and indicates whether the caller may retry.
//!
//! # Security
//!
//! Error messages never carry raw provider payloads or API keys. Providers
//! report through classified errors and the dispatch layer converts those into
//! envelope errors before anything reaches a caller.

use thiserror::Error;

/// Trait for Wayfind error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait WayfindErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets or provider response bodies.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried by resubmitting the whole pipeline.
    /// Non-recoverable errors need a configuration or input change first.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Admission**: Backpressure and governor shutdown
/// - **Provider**: Capability and language-model provider failures
/// - **Input**: Unknown capabilities and malformed capability inputs
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, WayfindErrorExt};
///
/// let error = EngineError::Backpressure { queued: 20, limit: 20 };
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::UnknownCapability("car_rental".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Admission control errors
    #[error("Request queue full: {queued}/{limit} requests waiting")]
    Backpressure { queued: usize, limit: usize },

    #[error("Concurrency governor is closed")]
    GovernorClosed,

    #[error("Request cancelled")]
    Cancelled,

    // Provider errors
    #[error("Capability provider error: {0}")]
    Provider(String),

    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    // Input errors
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Invalid input for {capability}: {reason}")]
    InvalidInput { capability: String, reason: String },

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WayfindErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::Backpressure { .. } => "The service is busy. Please try again shortly",
            Self::GovernorClosed => "The service is shutting down",
            Self::Cancelled => "The request was cancelled",

            Self::Provider(_) => "A search provider is unavailable. Try again later",
            Self::LLMProvider(_) => "Language model unavailable. Check the model server",

            Self::Parse(_) => "Received an unexpected response format",

            Self::UnknownCapability(_) => "The requested search type is not supported",
            Self::InvalidInput { .. } => "The search request is missing required details",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::GovernorClosed
            | Self::UnknownCapability(_)
            | Self::InvalidInput { .. } => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
