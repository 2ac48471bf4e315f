//! Error types for the dork runner.

use thiserror::Error;

/// Result type alias for dork runner operations.
pub type Result<T> = std::result::Result<T, DorkError>;

/// Errors that can occur while loading proxies, searching, or persisting results.
#[derive(Error, Debug)]
pub enum DorkError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request failed before or during transport (no proxy, timeout, refused).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A proxy list provider could not be reached or returned garbage.
    #[error("Proxy provider '{provider}' failed: {reason}")]
    ProviderFetch { provider: String, reason: String },

    /// No cached proxy list and every provider failed.
    #[error("No proxy source available: cache missing and every provider failed")]
    NoProxySource,

    /// No working proxy and no paid fallback configured.
    #[error("No usable proxies and no paid fallback configured")]
    NoUsableProxies,

    /// Failed to parse a response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Invalid run configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A proxy address that is not `host:port`.
    #[error("Invalid proxy address: {0}")]
    InvalidProxy(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl DorkError {
    /// Returns true for failures that the retry loop recovers from locally.
    pub fn is_transport(&self) -> bool {
        matches!(self, DorkError::Http(_) | DorkError::Transport(_))
    }
}
