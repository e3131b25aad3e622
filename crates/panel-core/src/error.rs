//! Error taxonomy for comparison and health checks

use std::time::Duration;

use thiserror::Error;

/// Result type for panel-core operations.
pub type Result<T> = std::result::Result<T, CompareError>;

/// Everything that can go wrong while talking to the comparison backend.
///
/// A single provider call failing is recorded in that provider's entry and a
/// failed health probe only flips the health state; neither is returned from
/// the run as a whole. Only `InvalidInput`, `NoProviders` and failures while
/// resolving the default provider set abort a comparison before it starts.
#[derive(Debug, Error)]
pub enum CompareError {
    /// Prompt was empty or whitespace only
    #[error("prompt must not be empty")]
    InvalidInput,

    /// The default provider set resolved to nothing
    #[error("no providers available to compare")]
    NoProviders,

    /// Network or protocol failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The call did not finish within its budget
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Payload could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),

    /// Provider-reported failure carried inside a successful HTTP exchange
    #[error("{0}")]
    Provider(String),

    /// Payload had no entry for the requested provider
    #[error("response did not include a result for '{0}'")]
    MissingResult(String),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl CompareError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
