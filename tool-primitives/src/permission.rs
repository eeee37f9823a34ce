//! Permission vocabulary: per-tool risk levels and the session policy mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Risk category attached to every tool descriptor.
///
/// Variants are ordered from least to most risky.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Runs without confirmation.
    #[default]
    Safe,
    /// Needs confirmation unless the policy mode says otherwise.
    Elevated,
    /// Always goes through the strict approval path.
    System,
    /// Blocked unless explicitly allow-listed.
    Dangerous,
}

impl PermissionLevel {
    /// Returns the canonical lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Elevated => "elevated",
            Self::System => "system",
            Self::Dangerous => "dangerous",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "elevated" => Ok(Self::Elevated),
            "system" => Ok(Self::System),
            "dangerous" => Ok(Self::Dangerous),
            other => Err(Error::unknown("permission level", other)),
        }
    }
}

/// Session-wide policy mode configured by the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Elevated tools run without asking.
    Auto,
    /// Elevated tools ask once per distinct call.
    #[default]
    Prompt,
    /// Elevated tools never run.
    Deny,
}

impl PolicyMode {
    /// Returns the canonical lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Prompt => "prompt",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "prompt" => Ok(Self::Prompt),
            "deny" => Ok(Self::Deny),
            other => Err(Error::unknown("policy mode", other)),
        }
    }
}
