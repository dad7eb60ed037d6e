//! Common error types for sitewatch components.

use std::fmt;

/// A specialized Result type for sitewatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for sitewatch operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("WHOIS error: {0}")]
    Whois(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new HTTP error.
    pub fn http(msg: impl fmt::Display) -> Self {
        Error::Http(msg.to_string())
    }

    /// Create a new TLS error.
    pub fn tls(msg: impl fmt::Display) -> Self {
        Error::Tls(msg.to_string())
    }

    /// Create a new certificate error.
    pub fn certificate(msg: impl fmt::Display) -> Self {
        Error::Certificate(msg.to_string())
    }

    /// Create a new WHOIS error.
    pub fn whois(msg: impl fmt::Display) -> Self {
        Error::Whois(msg.to_string())
    }

    /// Create a new timeout error.
    pub fn timeout(msg: impl fmt::Display) -> Self {
        Error::Timeout(msg.to_string())
    }

    /// Create a new invalid target error.
    pub fn invalid_target(msg: impl fmt::Display) -> Self {
        Error::InvalidTarget(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Whether the error came from a timeout rather than a refusal.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
