//! Error types for data parsing in verdant-types.

use thiserror::Error;

/// Errors that can occur when parsing or validating Verdant data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A value could not be interpreted (unknown enum name, bad label, ...).
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A form field failed validation.
    #[error("Invalid {field}: {message}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        message: String,
    },
}

impl ParseError {
    /// Create a field validation error.
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Result type alias using verdant-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
