//! In-process tools.

use async_trait::async_trait;
use tool_primitives::SourceType;
use tool_registry::LocalTool;

use crate::error::AdapterResult;
use crate::source::{DiscoveredTool, SourceMetadata, ToolSource};

/// Source wrapping an explicit, ordered list of [`LocalTool`] bindings.
#[derive(Debug, Clone)]
pub struct LocalSource {
    metadata: SourceMetadata,
    tools: Vec<LocalTool>,
}

impl LocalSource {
    /// Creates a source named `id` over the supplied bindings.
    #[must_use]
    pub fn new(id: impl Into<String>, tools: Vec<LocalTool>) -> Self {
        Self {
            metadata: SourceMetadata::new(id, SourceType::Local),
            tools,
        }
    }

    /// Bindings in registration order.
    #[must_use]
    pub fn tools(&self) -> &[LocalTool] {
        &self.tools
    }
}

#[async_trait]
impl ToolSource for LocalSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn discover(&self) -> AdapterResult<Vec<DiscoveredTool>> {
        Ok(self
            .tools
            .iter()
            .cloned()
            .map(|tool| {
                let (descriptor, handler) = tool.into_parts();
                DiscoveredTool {
                    descriptor,
                    handler,
                }
            })
            .collect())
    }
}
