//! Permission decision types returned by the gate.

use serde::{Deserialize, Serialize};

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// The call may proceed.
    Approved,
    /// The call is rejected.
    Denied,
}

/// What the decision was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    /// SAFE tools always run.
    SafeLevel,
    /// The configured policy mode settled it.
    PolicyMode,
    /// A grant cached earlier in the session settled it.
    SessionGrant,
    /// The dangerous-tool allow-list settled it.
    AllowList,
    /// The approval requester was asked.
    Approver,
    /// The tool is disabled.
    Disabled,
}

/// Structured decision emitted by the permission gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    kind: DecisionKind,
    basis: DecisionBasis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl PermissionDecision {
    /// Returns an approval.
    #[must_use]
    pub fn approve(basis: DecisionBasis) -> Self {
        Self {
            kind: DecisionKind::Approved,
            basis,
            reason: None,
        }
    }

    /// Returns a denial with an explanatory reason.
    #[must_use]
    pub fn deny(basis: DecisionBasis, reason: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::Denied,
            basis,
            reason: Some(reason.into()),
        }
    }

    /// Returns the decision kind.
    #[must_use]
    pub fn kind(&self) -> DecisionKind {
        self.kind
    }

    /// Returns what the decision was based on.
    #[must_use]
    pub fn basis(&self) -> DecisionBasis {
        self.basis
    }

    /// Returns true when the call may proceed.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.kind == DecisionKind::Approved
    }

    /// Returns true when the call is rejected.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.kind == DecisionKind::Denied
    }

    /// Returns the reason attached to a denial.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_helpers_work() {
        let approve = PermissionDecision::approve(DecisionBasis::SafeLevel);
        assert!(approve.is_approved());
        assert!(!approve.is_denied());
        assert_eq!(approve.reason(), None);

        let deny = PermissionDecision::deny(DecisionBasis::AllowList, "blocked");
        assert!(deny.is_denied());
        assert_eq!(deny.basis(), DecisionBasis::AllowList);
        assert_eq!(deny.reason(), Some("blocked"));
    }
}
