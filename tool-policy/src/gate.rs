//! The permission gate.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tool_primitives::{
    ExecutionContext, PermissionLevel, PolicyMode, ToolArguments, ToolDescriptor,
};
use tracing::info;

use crate::approval::{Approval, ApprovalRequest, ApprovalRequester, ApprovalSeverity};
use crate::decision::{DecisionBasis, PermissionDecision};
use crate::grants::{GrantCache, GrantKey, Resolution};
use crate::observer::DecisionObserver;

/// Decides whether a tool call may run.
///
/// | Level | auto | prompt | deny |
/// |---|---|---|---|
/// | SAFE | approve | approve | approve |
/// | ELEVATED | approve | ask once per `(tool, arguments)` | deny |
/// | SYSTEM | strict ask | strict ask | strict ask |
/// | DANGEROUS | allow-list | allow-list | allow-list |
///
/// ELEVATED answers are cached whatever they were. A SYSTEM answer is cached
/// for the whole tool only when the approver chose to remember it.
pub struct PermissionGate {
    mode: PolicyMode,
    approver: Arc<dyn ApprovalRequester>,
    grants: GrantCache,
    allow_list: RwLock<BTreeSet<String>>,
    observer: Option<Arc<dyn DecisionObserver>>,
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allow_list = self.allow_list.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("PermissionGate")
            .field("mode", &self.mode)
            .field("allow_list", &*allow_list)
            .field("grants", &self.grants)
            .finish_non_exhaustive()
    }
}

impl PermissionGate {
    /// Creates a gate for the policy mode using the supplied requester.
    #[must_use]
    pub fn new(mode: PolicyMode, approver: Arc<dyn ApprovalRequester>) -> Self {
        Self {
            mode,
            approver,
            grants: GrantCache::new(),
            allow_list: RwLock::new(BTreeSet::new()),
            observer: None,
        }
    }

    /// Seeds the dangerous-tool allow-list.
    #[must_use]
    pub fn with_allow_list<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.allow_dangerous(name);
        }
        self
    }

    /// Installs an observer notified of every decision.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Configured policy mode.
    #[must_use]
    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    /// Session grant cache.
    #[must_use]
    pub fn grants(&self) -> &GrantCache {
        &self.grants
    }

    /// Permits a DANGEROUS tool to run.
    pub fn allow_dangerous(&self, name: impl Into<String>) {
        let name = name.into();
        info!(tool = %name, "dangerous tool allow-listed");
        self.allow_list
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name);
    }

    /// Returns true when the tool is on the dangerous allow-list.
    #[must_use]
    pub fn is_allow_listed(&self, name: &str) -> bool {
        self.allow_list
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Removes the tool from the allow-list and drops all of its grants.
    pub fn revoke(&self, name: &str) {
        self.allow_list
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        self.grants.revoke_tool(name);
        info!(tool = %name, "tool permissions revoked");
    }

    /// Drops every session grant.
    pub fn clear_session_grants(&self) {
        self.grants.clear();
    }

    /// Whether the tool should be advertised at all.
    ///
    /// Disabled tools, DANGEROUS tools missing from the allow-list and
    /// ELEVATED tools under `deny` mode could never run, so they are hidden.
    #[must_use]
    pub fn is_visible(&self, descriptor: &ToolDescriptor) -> bool {
        if !descriptor.is_enabled() {
            return false;
        }
        match descriptor.permission_level() {
            PermissionLevel::Safe | PermissionLevel::System => true,
            PermissionLevel::Elevated => self.mode != PolicyMode::Deny,
            PermissionLevel::Dangerous => self.is_allow_listed(descriptor.name()),
        }
    }

    /// Evaluates one call.
    pub async fn check(
        &self,
        descriptor: &Arc<ToolDescriptor>,
        arguments: &ToolArguments,
        context: &ExecutionContext,
    ) -> PermissionDecision {
        let decision = self.evaluate(descriptor, arguments, context).await;
        if let Some(observer) = &self.observer {
            observer.on_decision(descriptor, &decision);
        }
        decision
    }

    async fn evaluate(
        &self,
        descriptor: &Arc<ToolDescriptor>,
        arguments: &ToolArguments,
        context: &ExecutionContext,
    ) -> PermissionDecision {
        let name = descriptor.name();
        if !descriptor.is_enabled() {
            return PermissionDecision::deny(
                DecisionBasis::Disabled,
                format!("tool `{name}` is disabled"),
            );
        }

        match descriptor.permission_level() {
            PermissionLevel::Safe => PermissionDecision::approve(DecisionBasis::SafeLevel),
            PermissionLevel::Dangerous => {
                if self.is_allow_listed(name) {
                    PermissionDecision::approve(DecisionBasis::AllowList)
                } else {
                    PermissionDecision::deny(
                        DecisionBasis::AllowList,
                        format!("tool `{name}` is dangerous and not on the allow-list"),
                    )
                }
            }
            PermissionLevel::Elevated => match self.mode {
                PolicyMode::Auto => PermissionDecision::approve(DecisionBasis::PolicyMode),
                PolicyMode::Deny => PermissionDecision::deny(
                    DecisionBasis::PolicyMode,
                    format!("tool `{name}` requires approval and policy mode is `deny`"),
                ),
                PolicyMode::Prompt => {
                    let request =
                        approval_request(descriptor, arguments, context, ApprovalSeverity::Standard);
                    let resolution = self
                        .grants
                        .resolve(GrantKey::for_call(name, arguments), || async {
                            (self.approver.ask(&request).await.is_approved(), true)
                        })
                        .await;
                    from_resolution(name, resolution)
                }
            },
            PermissionLevel::System => {
                let request =
                    approval_request(descriptor, arguments, context, ApprovalSeverity::Strict);
                let resolution = self
                    .grants
                    .resolve(GrantKey::for_tool(name), || async {
                        let answer = self.approver.ask(&request).await;
                        (answer.is_approved(), answer == Approval::ApproveAndRemember)
                    })
                    .await;
                from_resolution(name, resolution)
            }
        }
    }
}

fn approval_request(
    descriptor: &Arc<ToolDescriptor>,
    arguments: &ToolArguments,
    context: &ExecutionContext,
    severity: ApprovalSeverity,
) -> ApprovalRequest {
    ApprovalRequest {
        descriptor: Arc::clone(descriptor),
        arguments: arguments.clone(),
        context: context.clone(),
        severity,
    }
}

fn from_resolution(name: &str, resolution: Resolution) -> PermissionDecision {
    let basis = if resolution.cached {
        DecisionBasis::SessionGrant
    } else {
        DecisionBasis::Approver
    };
    if resolution.approved {
        PermissionDecision::approve(basis)
    } else if resolution.cached {
        PermissionDecision::deny(basis, format!("approval for tool `{name}` was refused earlier in this session"))
    } else {
        PermissionDecision::deny(basis, format!("approval for tool `{name}` was refused"))
    }
}
