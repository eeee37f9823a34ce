//! The façade the conversation layer talks to.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tool_policy::PermissionGate;
use tool_primitives::{ExecutionContext, FunctionSpec, ToolArguments, ToolDescriptor};
use tool_registry::{ToolFilter, ToolRegistry};
use tool_telemetry::{ExecutionSnapshot, Rejection};
use tracing::{debug, warn};

use crate::engine::ExecutionEngine;
use crate::result::{CallError, ToolResult};
use crate::scheduler::{SchedulerConfig, TaskScheduler};

/// One call requested by the AI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id echoed into the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name.
    pub name: String,
    /// Raw arguments.
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ToolCall {
    /// Creates a call without a correlation id.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Lists visible tools and runs batches of requested calls.
///
/// Each call goes through lookup, the permission gate and the execution
/// engine. Failures are isolated per call and results always come back in
/// request order.
#[derive(Clone)]
pub struct ToolOrchestrator {
    registry: Arc<ToolRegistry>,
    gate: Arc<PermissionGate>,
    engine: Arc<ExecutionEngine>,
    scheduler: TaskScheduler,
}

impl fmt::Debug for ToolOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolOrchestrator")
            .field("tools", &self.registry.len())
            .field("mode", &self.gate.mode())
            .field("timeout", &self.engine.config().timeout())
            .field("max_concurrency", &self.scheduler.config().limit())
            .finish_non_exhaustive()
    }
}

impl ToolOrchestrator {
    /// Wires the three collaborators with the default concurrency limit.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        gate: Arc<PermissionGate>,
        engine: Arc<ExecutionEngine>,
    ) -> Self {
        Self {
            registry,
            gate,
            engine,
            scheduler: TaskScheduler::default(),
        }
    }

    /// Replaces the batch concurrency limit.
    #[must_use]
    pub fn with_scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = TaskScheduler::new(config);
        self
    }

    /// Catalog the orchestrator reads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Gate consulted before each call.
    #[must_use]
    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    /// Execution statistics so far.
    #[must_use]
    pub fn stats(&self) -> ExecutionSnapshot {
        self.engine.stats().snapshot()
    }

    /// Descriptors that may be advertised under the current policy.
    #[must_use]
    pub fn get_available_tools(&self, context: &ExecutionContext) -> Vec<Arc<ToolDescriptor>> {
        let visible: Vec<_> = self
            .registry
            .list(&ToolFilter::All)
            .into_iter()
            .filter(|descriptor| self.gate.is_visible(descriptor))
            .collect();
        debug!(
            conversation = ?context.conversation_id(),
            visible = visible.len(),
            registered = self.registry.len(),
            "resolved tool catalog"
        );
        visible
    }

    /// Visible tools in the neutral function-calling shape.
    #[must_use]
    pub fn function_specs(&self, context: &ExecutionContext) -> Vec<FunctionSpec> {
        self.get_available_tools(context)
            .iter()
            .map(|descriptor| descriptor.export())
            .collect()
    }

    /// Runs a batch of calls, returning one result per call in request order.
    pub async fn execute_requested_tools(
        &self,
        calls: Vec<ToolCall>,
        context: &ExecutionContext,
    ) -> Vec<ToolResult> {
        let labels: Vec<(String, Option<String>)> = calls
            .iter()
            .map(|call| (call.name.clone(), call.id.clone()))
            .collect();
        let jobs = calls.into_iter().map(|call| {
            let this = self.clone();
            let context = context.clone();
            async move { this.execute_tool(call, &context).await }
        });

        self.scheduler
            .run_ordered(jobs)
            .await
            .into_iter()
            .zip(labels)
            .map(|(joined, (name, id))| match joined {
                Ok(result) => result,
                Err(err) => internal_failure(name, id, &err.to_string()),
            })
            .collect()
    }

    /// Runs one call through lookup, permission and execution.
    pub async fn execute_tool(&self, call: ToolCall, context: &ExecutionContext) -> ToolResult {
        let ToolCall {
            id,
            name,
            arguments,
        } = call;

        let tool = match self.registry.get(&name) {
            Ok(tool) => tool,
            Err(err) => {
                warn!(tool = %name, error = %err, "requested tool is not registered");
                self.engine.stats().record_rejection(Rejection::Invalid);
                return ToolResult::failure(&CallError::NotFound { name }, Duration::ZERO)
                    .with_call_id(id);
            }
        };

        let descriptor = tool.shared_descriptor();
        let decision = self.gate.check(&descriptor, &arguments, context).await;
        if decision.is_denied() {
            self.engine.stats().record_rejection(Rejection::Denied);
            let error = CallError::PermissionDenied {
                name,
                reason: decision.reason().unwrap_or("denied").to_owned(),
            };
            return ToolResult::failure(&error, Duration::ZERO).with_call_id(id);
        }

        self.engine
            .execute(&descriptor, tool.handler(), arguments, context)
            .await
            .with_call_id(id)
    }
}

fn internal_failure(name: String, id: Option<String>, reason: &str) -> ToolResult {
    warn!(tool = %name, reason, "tool call could not be run");
    let error = CallError::Internal {
        name,
        reason: reason.to_owned(),
    };
    ToolResult::failure(&error, Duration::ZERO).with_call_id(id)
}
