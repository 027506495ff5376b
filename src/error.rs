// src/error.rs

//! Unified error handling for the dedup index.

use std::fmt;

use thiserror::Error;

use crate::models::JobResult;

/// Result type alias for dedup operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Keyed store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Geocoder lookup failed
    #[error("Geocode error for '{location}': {message}")]
    Geocode { location: String, message: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Batch aborted by the error-rate circuit breaker
    #[error(
        "Batch aborted: error rate {:.1}% ({errors}/{attempted} postings failed)",
        .error_rate * 100.0
    )]
    FailFast {
        error_rate: f64,
        errors: usize,
        attempted: usize,
        /// Results for every posting attempted before the abort
        partial: Vec<JobResult>,
    },
}

impl AppError {
    /// Create a store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    /// Create a geocode error for a location.
    pub fn geocode(location: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Geocode {
            location: location.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error came from the index store.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
