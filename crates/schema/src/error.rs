//! Error types for timer-state encoding and decoding.
//!
//! All errors are local and recoverable. A caller reading a corrupt persisted
//! record should log it and move on to the next one.

use thiserror::Error;

use crate::WireError;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Codec error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Bytes do not form a valid message (truncation, bad framing, bad UTF-8).
    #[error("malformed input: {0}")]
    MalformedInput(#[from] WireError),

    /// Payload type disagrees with the discriminator that selects it.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Fully qualified message name the discriminator requires
        expected: &'static str,
        /// Type URL actually carried by the payload
        found: String,
    },

    /// Composite triggers nested deeper than the configured limit.
    #[error("trigger nesting exceeds limit of {limit}")]
    RecursionLimitExceeded {
        /// Configured maximum trigger depth
        limit: usize,
    },

    /// Caller-supplied output buffer cannot hold the encoded message.
    #[error("insufficient buffer capacity: need {required} bytes, {remaining} available")]
    InsufficientCapacity {
        /// Encoded size of the message
        required: usize,
        /// Space left in the buffer
        remaining: usize,
    },

    /// Codec configuration could not be parsed.
    #[error("invalid codec configuration: {reason}")]
    Config {
        /// Parser message
        reason: String,
    },
}

impl Error {
    /// Create a type mismatch error.
    pub fn type_mismatch(expected: &'static str, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// True for [`Error::MalformedInput`].
    #[must_use]
    pub const fn is_malformed_input(&self) -> bool {
        matches!(self, Self::MalformedInput(_))
    }

    /// True for [`Error::TypeMismatch`].
    #[must_use]
    pub const fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }

    /// True for [`Error::RecursionLimitExceeded`].
    #[must_use]
    pub const fn is_recursion_limit(&self) -> bool {
        matches!(self, Self::RecursionLimitExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        assert_eq!(
            Error::type_mismatch(
                "org.drools.serialization.protobuf.CronTrigger",
                "type.googleapis.com/org.drools.serialization.protobuf.IntervalTrigger"
            )
            .to_string(),
            "type mismatch: expected org.drools.serialization.protobuf.CronTrigger, \
             found type.googleapis.com/org.drools.serialization.protobuf.IntervalTrigger"
        );

        assert_eq!(
            Error::RecursionLimitExceeded { limit: 16 }.to_string(),
            "trigger nesting exceeds limit of 16"
        );

        assert_eq!(
            Error::from(WireError::message_too_large(20, 10)).to_string(),
            "malformed input: message too large: 20 bytes (max 10 bytes)"
        );
    }

    #[test]
    fn test_classification() {
        assert!(Error::from(WireError::TrailingBytes { remaining: 1 }).is_malformed_input());
        assert!(Error::type_mismatch("x", "y").is_type_mismatch());
        assert!(Error::RecursionLimitExceeded { limit: 1 }.is_recursion_limit());
        assert!(!Error::config("bad").is_malformed_input());
    }
}
