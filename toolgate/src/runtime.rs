use std::sync::Arc;

use tool_adapters::{BootstrapReport, boot};
use tool_config::ToolsConfig;
use tool_kernel::{EngineConfig, ExecutionEngine, SchedulerConfig, ToolOrchestrator};
use tool_policy::{ApprovalRequester, PermissionGate, TracingDecisionObserver};
use tool_registry::{LocalTool, ToolRegistry};
use tracing::info;

/// A started tool subsystem.
#[derive(Debug, Clone)]
pub struct Runtime {
    orchestrator: ToolOrchestrator,
    report: BootstrapReport,
}

impl Runtime {
    /// Registers the enabled built-in modules plus every configured
    /// extension and remote server, then wires the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in descriptor is invalid. Failing sources
    /// are not errors; they are listed in [`Runtime::report`].
    pub async fn start(
        config: &ToolsConfig,
        approver: Arc<dyn ApprovalRequester>,
    ) -> tool_primitives::Result<Self> {
        let builtins = tool_builtins::tools_for(&config.enabled_builtin_modules)?;
        Ok(Self::start_with(config, approver, builtins).await)
    }

    /// Like [`Runtime::start`], with an explicit list of local tools in
    /// place of the built-in modules.
    pub async fn start_with(
        config: &ToolsConfig,
        approver: Arc<dyn ApprovalRequester>,
        local_tools: Vec<LocalTool>,
    ) -> Self {
        let registry = Arc::new(ToolRegistry::new());
        let report = boot(config, &registry, local_tools).await;

        let gate = PermissionGate::new(config.permission_mode, approver)
            .with_allow_list(config.dangerous_allow_list.iter().cloned())
            .with_observer(Arc::new(TracingDecisionObserver));
        let engine = ExecutionEngine::new(EngineConfig::new(config.execution_timeout()));
        let orchestrator = ToolOrchestrator::new(registry, Arc::new(gate), Arc::new(engine))
            .with_scheduler(SchedulerConfig::with_limit(config.max_concurrent_tools));

        info!(
            tools = report.tool_count(),
            mode = ?config.permission_mode,
            "tool runtime ready"
        );
        Self {
            orchestrator,
            report,
        }
    }

    /// The orchestrator serving tool calls.
    #[must_use]
    pub fn orchestrator(&self) -> &ToolOrchestrator {
        &self.orchestrator
    }

    /// What the bootstrap registered and what failed.
    #[must_use]
    pub fn report(&self) -> &BootstrapReport {
        &self.report
    }
}
