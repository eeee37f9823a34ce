//! Permission gate for tool calls.
//!
//! [`PermissionGate`] turns a descriptor's [`PermissionLevel`] plus the
//! configured [`PolicyMode`], the session's grant cache and the dangerous-tool
//! allow-list into a [`PermissionDecision`]. Interactive confirmation is
//! delegated to an injected [`ApprovalRequester`].
//!
//! [`PermissionLevel`]: tool_primitives::PermissionLevel
//! [`PolicyMode`]: tool_primitives::PolicyMode

#![warn(missing_docs, clippy::pedantic)]

pub mod approval;
pub mod decision;
pub mod gate;
pub mod grants;
pub mod observer;

pub use approval::{
    Approval, ApprovalRequest, ApprovalRequester, ApprovalSeverity, ScriptedApprover,
    TerminalApprover, destructive_warning,
};
pub use decision::{DecisionBasis, DecisionKind, PermissionDecision};
pub use gate::PermissionGate;
pub use grants::{GrantCache, GrantKey, GrantScope, PermissionGrant, Resolution};
pub use observer::{DecisionObserver, TracingDecisionObserver};
