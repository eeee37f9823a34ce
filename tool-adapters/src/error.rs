//! Failures raised while discovering or calling tools from a source.

use thiserror::Error;

/// Result of a source or transport operation.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Why a source could not list or run its tools.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// A manifest or server entry cannot be turned into a source.
    #[error("source not configured: {reason}")]
    Configuration {
        /// Which setting is wrong and how.
        reason: String,
    },

    /// Discovery failed, so the source contributes no tools.
    #[error("source `{source_id}` failed to initialise: {reason}")]
    Initialization {
        /// Identifier of the failing source.
        source_id: String,
        /// Underlying cause.
        reason: String,
    },

    /// A child process or HTTP endpoint could not be reached.
    #[error("transport error: {reason}")]
    Transport {
        /// Cause reported by the process or socket.
        reason: String,
    },

    /// The peer answered, but not in the expected shape.
    #[error("protocol error: {reason}")]
    Protocol {
        /// What was malformed.
        reason: String,
    },
}

impl AdapterError {
    /// Builds [`AdapterError::Configuration`].
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Builds [`AdapterError::Initialization`] for `source_id`.
    #[must_use]
    pub fn initialization(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Initialization {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// Builds [`AdapterError::Transport`].
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Builds [`AdapterError::Protocol`].
    #[must_use]
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }
}
