//! Error types for linkspeed
//!
//! This module provides the crate-wide error type. Only a few variants ever reach
//! a subscriber: input errors abort a batch before dispatch and are reported as a
//! single `error` frame. Per-link probe and throughput failures never leave the
//! pipeline that produced them; they are folded into sentinel progress values.

use thiserror::Error;

/// Result type alias for linkspeed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for linkspeed
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed batch message, unparsable options or no extractable links
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Subscription fetch failed (timeout, connect failure, bad status)
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Network error from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Subscription body was not valid base64 / UTF-8
    #[error("decode error: {0}")]
    Decode(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Latency probe failed for one link
    #[error("probe error: {0}")]
    Probe(String),

    /// Throughput measurement failed for one link
    #[error("throughput error: {0}")]
    Throughput(String),

    /// Outbound transport write failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "bind_address")
        key: Option<String>,
    },

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidInput`]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Whether this error rejects the batch message itself
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }

    /// Short machine-readable reason used in `error` progress frames
    pub fn reason(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invaliddata",
            Error::Fetch(_) | Error::Network(_) => "invalidsub",
            Error::Decode(_) => "invalidsub",
            Error::Serialization(_) => "invaliddata",
            Error::Io(_) => "io",
            Error::Probe(_) => "ping",
            Error::Throughput(_) => "speed",
            Error::Transport(_) => "transport",
            Error::Config { .. } => "config",
            Error::ApiServerError(_) => "server",
        }
    }
}
