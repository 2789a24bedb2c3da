//! Error types for the CBL client.

use thiserror::Error;

use crate::auth::error::ExchangeError;

/// Primary error type for configuration, storage and setup.
///
/// The authorization state machine itself never surfaces errors; failures
/// inside a running flow resolve into an [`AuthorizationState`] instead.
///
/// [`AuthorizationState`]: crate::auth::AuthorizationState
#[derive(Error, Debug)]
pub enum CblError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Authorizer is shut down")]
    Shutdown,
}

impl CblError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<toml::de::Error> for CblError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for CblError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Result type alias for CBL operations.
pub type Result<T> = std::result::Result<T, CblError>;
