//! Hooks notified of every permission decision.

use tool_primitives::ToolDescriptor;
use tracing::{debug, warn};

use crate::decision::{DecisionKind, PermissionDecision};

/// Observer invoked whenever the gate produces a decision.
pub trait DecisionObserver: Send + Sync {
    /// Records the decision emitted for the supplied tool.
    fn on_decision(&self, descriptor: &ToolDescriptor, decision: &PermissionDecision);
}

/// Observer that emits decisions to the tracing system.
#[derive(Debug, Default)]
pub struct TracingDecisionObserver;

impl DecisionObserver for TracingDecisionObserver {
    fn on_decision(&self, descriptor: &ToolDescriptor, decision: &PermissionDecision) {
        let level = descriptor.permission_level();
        match decision.kind() {
            DecisionKind::Approved => {
                debug!(tool = %descriptor.name(), %level, basis = ?decision.basis(), "permission approved");
            }
            DecisionKind::Denied => {
                warn!(
                    tool = %descriptor.name(),
                    %level,
                    basis = ?decision.basis(),
                    reason = decision.reason().unwrap_or_default(),
                    "permission denied"
                );
            }
        }
    }
}
