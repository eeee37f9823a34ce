//! Structured call outcomes.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::validate::Violation;

/// Why a requested call did not produce a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// No tool with that name is registered.
    #[error("tool `{name}` not found")]
    NotFound {
        /// Requested name.
        name: String,
    },

    /// Arguments do not satisfy the tool's schema.
    #[error("invalid arguments for `{name}`: {}", join(violations))]
    Validation {
        /// Tool name.
        name: String,
        /// Every problem found.
        violations: Vec<Violation>,
    },

    /// The permission gate refused the call.
    #[error("permission denied for `{name}`: {reason}")]
    PermissionDenied {
        /// Tool name.
        name: String,
        /// Gate explanation.
        reason: String,
    },

    /// The handler exceeded its time budget and was cancelled.
    #[error("tool `{name}` failed: timed out after {}", HumanDuration(*timeout))]
    Timeout {
        /// Tool name.
        name: String,
        /// Budget that elapsed.
        timeout: Duration,
    },

    /// The handler reported an error or panicked.
    #[error("tool `{name}` failed: {reason}")]
    Execution {
        /// Tool name.
        name: String,
        /// Handler message.
        reason: String,
    },

    /// The runtime could not run the call at all.
    #[error("tool `{name}` could not be scheduled: {reason}")]
    Internal {
        /// Tool name.
        name: String,
        /// Runtime failure details.
        reason: String,
    },
}

impl CallError {
    /// Stable label recorded as `error_kind` in results.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation { .. } => "validation",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Timeout { .. } => "timeout",
            Self::Execution { .. } => "execution",
            Self::Internal { .. } => "internal",
        }
    }

    /// Name of the tool the call targeted.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        match self {
            Self::NotFound { name }
            | Self::Validation { name, .. }
            | Self::PermissionDenied { name, .. }
            | Self::Timeout { name, .. }
            | Self::Execution { name, .. }
            | Self::Internal { name, .. } => name,
        }
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

struct HumanDuration(Duration);

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.subsec_nanos() == 0 {
            write!(f, "{}s", self.0.as_secs())
        } else {
            write!(f, "{}ms", self.0.as_millis())
        }
    }
}

/// Immutable outcome of one requested call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    call_id: Option<String>,
    tool_name: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    elapsed: Duration,
    metadata: Map<String, Value>,
}

impl ToolResult {
    /// Successful outcome carrying the handler's value.
    #[must_use]
    pub fn success(tool_name: impl Into<String>, value: Value, elapsed: Duration) -> Self {
        Self {
            call_id: None,
            tool_name: tool_name.into(),
            success: true,
            result: Some(value),
            error: None,
            error_kind: None,
            elapsed,
            metadata: Map::new(),
        }
    }

    /// Failed outcome describing `error`, with recovery hints in the metadata.
    #[must_use]
    pub fn failure(error: &CallError, elapsed: Duration) -> Self {
        let message = error.to_string();
        let mut metadata = Map::new();
        let suggestions = recovery_suggestions(&message);
        if !suggestions.is_empty() {
            metadata.insert(
                "recovery_suggestions".to_owned(),
                Value::from(suggestions),
            );
        }
        Self {
            call_id: None,
            tool_name: error.tool_name().to_owned(),
            success: false,
            result: None,
            error: Some(message),
            error_kind: Some(error.kind()),
            elapsed,
            metadata,
        }
    }

    /// Builds a result from an engine outcome.
    #[must_use]
    pub fn from_outcome(
        tool_name: &str,
        outcome: Result<Value, CallError>,
        elapsed: Duration,
    ) -> Self {
        match outcome {
            Ok(value) => Self::success(tool_name, value, elapsed),
            Err(error) => Self::failure(&error, elapsed),
        }
    }

    /// Attaches the caller's correlation id.
    #[must_use]
    pub fn with_call_id(mut self, call_id: Option<String>) -> Self {
        self.call_id = call_id;
        self
    }

    /// Attaches one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Correlation id echoed from the request.
    #[must_use]
    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    /// Tool the call targeted.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Whether the call produced a value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Value returned by the handler.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Human-readable failure description.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Failure category, see [`CallError::kind`].
    #[must_use]
    pub fn error_kind(&self) -> Option<&'static str> {
        self.error_kind
    }

    /// Wall time from request to outcome.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Free-form metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Recovery hints attached to a failure.
    #[must_use]
    pub fn recovery_suggestions(&self) -> Vec<&str> {
        self.metadata
            .get("recovery_suggestions")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(elapsed.as_millis())
}

const HINTS: &[(&[&str], [&str; 3])] = &[
    (
        &["file not found", "no such file"],
        [
            "Check if the file path is correct",
            "Verify the file exists using the list_directory tool",
            "Use an absolute path instead of a relative one",
        ],
    ),
    (
        &["permission denied", "access denied"],
        [
            "Check file permissions",
            "Ask the operator to approve or allow-list the tool",
            "Verify you have access to the directory",
        ],
    ),
    (
        &["network", "connection", "timeout", "timed out"],
        [
            "Check the network connection",
            "Try again in a few moments",
            "Verify the URL or service is reachable",
        ],
    ),
    (
        &["argument", "parameter"],
        [
            "Check the tool's parameter requirements",
            "Verify argument types match the expected schema",
            "Look at the tool's examples for valid calls",
        ],
    ),
];

/// Hints derived from keywords in an error message.
#[must_use]
pub fn recovery_suggestions(message: &str) -> Vec<&'static str> {
    let lower = message.to_lowercase();
    HINTS
        .iter()
        .filter(|(needles, _)| needles.iter().any(|needle| lower.contains(needle)))
        .flat_map(|(_, hints)| hints.iter().copied())
        .collect()
}
