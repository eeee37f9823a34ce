//! Shared error definitions for tool primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the primitives crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided conversation identifier could not be parsed.
    #[error("invalid conversation id: {source}")]
    InvalidConversationId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Descriptor failed validation.
    #[error("invalid tool descriptor `{name}`: {reason}")]
    InvalidDescriptor {
        /// Name of the offending tool (may be empty).
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A textual enum value did not match any known variant.
    #[error("unknown {kind} `{value}`")]
    UnknownVariant {
        /// Which vocabulary was being parsed (e.g. `permission level`).
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

impl Error {
    pub(crate) fn descriptor(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}
