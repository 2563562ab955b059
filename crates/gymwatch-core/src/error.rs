//! Error types for gymwatch-core.
//!
//! Everything the upstream can do wrong collapses into four kinds:
//!
//! | Error | Meaning | Recovered where |
//! |-------|---------|-----------------|
//! | [`Error::Network`] / [`Error::Timeout`] | transport failure, abort, timeout | Reconciler fallback |
//! | [`Error::Status`] | non-success HTTP status | Reconciler fallback |
//! | [`Error::Parse`] | body did not match the single expected schema | Reconciler fallback |
//! | [`Error::MissingIdentity`] | no upstream identifier mapping for a machine | Reconciler fallback |
//!
//! None of these propagate past the reconciler or the cache store as raised
//! failures; they surface only through tracing and per-device statistics.

use thiserror::Error;

/// Errors that can occur when talking to the upstream telemetry or
/// geocoding APIs.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error
/// variants in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport-level failure (connect error, abort, timeout inside reqwest).
    #[error("Network failure: {0}")]
    Network(#[from] reqwest::Error),

    /// An operation exceeded its deadline.
    #[error("Operation '{operation}' timed out")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// The upstream answered with a non-success status.
    #[error("Upstream returned HTTP {status} for '{operation}'")]
    Status {
        /// The operation that failed.
        operation: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body did not match the single expected schema.
    #[error("Parse failure: {0}")]
    Parse(String),

    /// A tracked machine has no upstream identifier mapping.
    #[error("No upstream identity mapping for machine '{0}'")]
    MissingIdentity(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a parse failure.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a non-success status error.
    pub fn status(operation: impl Into<String>, status: u16) -> Self {
        Self::Status {
            operation: operation.into(),
            status,
        }
    }
}

impl From<gymwatch_types::ParseError> for Error {
    fn from(err: gymwatch_types::ParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type alias using gymwatch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
