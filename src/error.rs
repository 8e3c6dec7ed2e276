//! Error taxonomy for the filter core.
//!
//! Only configuration and rate-limit failures reach an analyze caller. Transport
//! failures are recorded in the audit entry and degrade to a permissive verdict;
//! model-output parse failures never leave the response parser.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Rate limit exceeded. Please wait a moment.")]
    RateLimited,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Filter disabled")]
    Disabled,

    #[error("API key not configured")]
    MissingApiKey,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{provider} request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} API error: {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("{provider} returned no choices")]
    EmptyResponse { provider: &'static str },

    /// Used by test transports and the mock provider.
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("audit storage io: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}
