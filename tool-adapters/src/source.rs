//! The common shape of every tool source.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tool_primitives::{SourceType, ToolDescriptor};
use tool_registry::ToolHandler;

use crate::error::AdapterResult;

/// Identity of a source, known before discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetadata {
    id: String,
    source_type: SourceType,
}

impl SourceMetadata {
    /// Creates metadata for a source.
    #[must_use]
    pub fn new(id: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            id: id.into(),
            source_type,
        }
    }

    /// Source identifier used in logs and reports.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Kind of source.
    #[must_use]
    pub const fn source_type(&self) -> SourceType {
        self.source_type
    }
}

impl fmt::Display for SourceMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_type, self.id)
    }
}

/// A tool ready to be registered.
#[derive(Clone)]
pub struct DiscoveredTool {
    /// Static metadata.
    pub descriptor: ToolDescriptor,
    /// Executable capability.
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for DiscoveredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveredTool")
            .field("name", &self.descriptor.name())
            .field("source", &self.handler.source_type())
            .finish()
    }
}

/// One origin of tools.
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Identity of the source.
    fn metadata(&self) -> &SourceMetadata;

    /// Enumerates the source's tools. Called once at startup.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`](crate::AdapterError) when the source cannot
    /// be reached or enumerated; no tool from it is registered in that case.
    async fn discover(&self) -> AdapterResult<Vec<DiscoveredTool>>;
}
