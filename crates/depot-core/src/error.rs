//! # Validation Errors
//!
//! Input that fails validation is rejected before any state is touched.
//! Every variant names the offending field so API clients can point at it.

use thiserror::Error;

/// Malformed or out-of-range input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was empty or missing.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// A field carried a value outside its allowed range.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A timestamp could not be parsed.
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    /// A string did not name any variant of a closed enum.
    #[error("unknown {kind} {value:?}")]
    UnknownVariant {
        /// The enum being parsed (e.g. "asset kind").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// An identifier could not be parsed.
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidValue`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
