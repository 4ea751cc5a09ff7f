//! Error types for webgate
//!
//! This module provides the error hierarchy using `thiserror`. Nothing in the
//! gatekeeper core is fatal: policy violations, abandoned capability requests
//! and picker launch failures are all recovered locally. These types cover
//! configuration, host seams that can fail, and the replay driver.

use thiserror::Error;

/// The main error type for webgate operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Capability delegation errors
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Allow-list and shell configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The allow-set has no entries
    #[error("Allow-list cannot be empty")]
    EmptyAllowList,

    /// An allow-set entry is not a lowercase host suffix
    #[error("Invalid allow-list entry {entry:?}: {reason}")]
    InvalidHost {
        /// The offending entry
        entry: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// The configured start URL is refused by the allow-list
    #[error("Start URL is not permitted by the allow-list: {0}")]
    StartUrlNotAllowed(String),

    /// An environment variable could not be interpreted
    #[error("Invalid value for {var}: {message}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Parse failure
        message: String,
    },
}

/// Errors raised by the host while fulfilling a capability request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// No activity/handler is available to show the picker
    #[error("No handler available for {0}")]
    NoHandler(String),

    /// The picker was found but refused to start
    #[error("Picker launch failed: {0}")]
    LaunchFailed(String),
}

/// Errors raised by a cookie engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    /// Writing the cookie store to durable storage failed
    #[error("Cookie flush failed: {0}")]
    FlushFailed(String),

    /// Removing cookies failed
    #[error("Cookie removal failed: {0}")]
    RemoveFailed(String),
}

/// Result type alias for webgate operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }
}
