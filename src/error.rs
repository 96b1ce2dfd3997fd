// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failed (connection, body decoding, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with a non-200 status, even after the retry
    #[error("Fetch failed for {url}: status {status}")]
    FetchFailed { url: String, status: u16 },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Keyword pattern failed to compile
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Expected markup was missing or unreadable
    #[error("Extraction error for {context}: {message}")]
    Extraction { context: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
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

    /// Create an extraction error with context.
    pub fn extraction(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Extraction {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a fetch failure carrying the last status code.
    pub fn fetch_failed(url: impl Into<String>, status: u16) -> Self {
        Self::FetchFailed {
            url: url.into(),
            status,
        }
    }
}
