//! Startup registration of every configured source.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tool_config::ToolsConfig;
use tool_primitives::SourceType;
use tool_registry::{LocalTool, RegistryError, ToolRegistry};
use tracing::{info, warn};

use crate::error::AdapterError;
use crate::extension::ExtensionSource;
use crate::local::LocalSource;
use crate::remote::RemoteSource;
use crate::source::ToolSource;

/// Identifier of the source holding in-process tools.
pub const LOCAL_SOURCE_ID: &str = "builtin";

/// Tools a source contributed to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    /// Source identifier.
    pub source_id: String,
    /// Kind of source.
    pub source_type: SourceType,
    /// Registered tool names, in registration order.
    pub tools: Vec<String>,
}

/// A source that did not come up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    /// Source identifier.
    pub source_id: String,
    /// Rendered error.
    pub error: String,
}

/// Outcome of a bootstrap pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Sources that registered, in the order they were supplied.
    pub registered: Vec<SourceSummary>,
    /// Sources that failed and are absent from the catalog.
    pub failed: Vec<SourceFailure>,
    /// Tool names dropped because an earlier source already owns them.
    pub skipped: Vec<String>,
}

impl BootstrapReport {
    /// Number of tools registered across all sources.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.registered.iter().map(|summary| summary.tools.len()).sum()
    }

    fn fail(&mut self, source_id: impl Into<String>, error: &AdapterError) {
        let source_id = source_id.into();
        warn!(source = %source_id, error = %error, "tool source unavailable");
        self.failed.push(SourceFailure {
            source_id,
            error: error.to_string(),
        });
    }
}

/// Discovers every source concurrently, then registers their tools in the
/// order the sources were supplied.
///
/// A source whose discovery fails contributes nothing. A tool whose name is
/// already registered is skipped without affecting the rest of its source.
pub async fn register_sources(
    registry: &ToolRegistry,
    sources: &[Arc<dyn ToolSource>],
) -> BootstrapReport {
    let discovered = join_all(sources.iter().map(|source| source.discover())).await;

    let mut report = BootstrapReport::default();
    for (source, outcome) in sources.iter().zip(discovered) {
        let metadata = source.metadata();
        let tools = match outcome {
            Ok(tools) => tools,
            Err(err) => {
                report.fail(metadata.id(), &err);
                continue;
            }
        };

        let mut names = Vec::with_capacity(tools.len());
        for tool in tools {
            let name = tool.descriptor.name().to_owned();
            match registry.register(tool.descriptor, tool.handler) {
                Ok(()) => names.push(name),
                Err(RegistryError::DuplicateTool { name }) => {
                    warn!(source = %metadata, tool = %name, "tool name already taken; skipping");
                    report.skipped.push(name);
                }
                Err(err) => warn!(source = %metadata, error = %err, "tool registration failed"),
            }
        }
        info!(source = %metadata, tools = names.len(), "tool source registered");
        report.registered.push(SourceSummary {
            source_id: metadata.id().to_owned(),
            source_type: metadata.source_type(),
            tools: names,
        });
    }
    report
}

/// Builds every source described by `config` and registers it.
///
/// Local tools come first, then extensions sorted by directory name, then
/// enabled remote servers in configuration order. Nothing is registered when
/// the subsystem is disabled.
pub async fn boot(
    config: &ToolsConfig,
    registry: &ToolRegistry,
    local_tools: Vec<LocalTool>,
) -> BootstrapReport {
    if !config.enabled {
        info!("tool subsystem disabled; no sources registered");
        return BootstrapReport::default();
    }

    let mut early_failures = BootstrapReport::default();
    let mut sources: Vec<Arc<dyn ToolSource>> =
        vec![Arc::new(LocalSource::new(LOCAL_SOURCE_ID, local_tools))];

    if let Some(dir) = &config.extensions_dir {
        match ExtensionSource::scan(dir) {
            Ok(extensions) => sources.extend(
                extensions
                    .into_iter()
                    .map(|extension| Arc::new(extension) as Arc<dyn ToolSource>),
            ),
            Err(err) => early_failures.fail(dir.display().to_string(), &err),
        }
    }

    for server in config.enabled_remote_servers() {
        match RemoteSource::from_config(server) {
            Ok(source) => sources.push(Arc::new(source)),
            Err(err) => early_failures.fail(server.name.clone(), &err),
        }
    }

    let mut report = register_sources(registry, &sources).await;
    early_failures.failed.append(&mut report.failed);
    report.failed = early_failures.failed;
    info!(
        tools = report.tool_count(),
        failed = report.failed.len(),
        "tool bootstrap complete"
    );
    report
}
