//! Error types for data parsing in gymwatch-types.

use thiserror::Error;

/// Errors that can occur when parsing upstream telemetry values.
///
/// This error type is transport-agnostic and does not include
/// HTTP-specific errors (those belong in gymwatch-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A wire token did not match the single expected vocabulary.
    #[error("Unexpected value for {field}: '{value}'")]
    UnexpectedValue {
        /// The semantic field being parsed.
        field: &'static str,
        /// The offending wire token.
        value: String,
    },

    /// A timestamp string could not be parsed as RFC 3339.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl ParseError {
    /// Create an unexpected-value error for a field.
    pub fn unexpected(field: &'static str, value: impl Into<String>) -> Self {
        Self::UnexpectedValue {
            field,
            value: value.into(),
        }
    }
}

/// Result type alias using gymwatch-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
