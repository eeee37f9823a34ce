//! Runtime catalog of tool descriptors and their handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tool_primitives::{SourceType, ToolCategory, ToolDescriptor};
use tracing::{debug, info};

use crate::handler::ToolHandler;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors produced by the registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },
}

/// Descriptor and handler pair stored for one tool.
#[derive(Clone)]
pub struct RegisteredTool {
    descriptor: Arc<ToolDescriptor>,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    /// Returns the descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Returns a shared handle to the descriptor.
    #[must_use]
    pub fn shared_descriptor(&self) -> Arc<ToolDescriptor> {
        Arc::clone(&self.descriptor)
    }

    /// Returns a shared handle to the handler.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.descriptor.name())
            .field("source", &self.handler.source_type())
            .finish()
    }
}

/// Selects a subset of the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolFilter {
    /// Every registered tool.
    #[default]
    All,
    /// Tools in one category.
    Category(ToolCategory),
    /// Tools carrying a tag.
    Tag(String),
    /// Tools provided by one kind of source.
    Source(SourceType),
    /// Tools provided by one named source, such as a remote server.
    SourceId(String),
}

impl ToolFilter {
    /// Returns `true` when the descriptor passes the filter.
    #[must_use]
    pub fn matches(&self, descriptor: &ToolDescriptor) -> bool {
        match self {
            Self::All => true,
            Self::Category(category) => descriptor.category() == *category,
            Self::Tag(tag) => descriptor.tags().contains(tag),
            Self::Source(source) => descriptor.source_type() == *source,
            Self::SourceId(id) => descriptor.source_id() == id,
        }
    }
}

/// A search result with its relevance score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Matching tool.
    pub descriptor: Arc<ToolDescriptor>,
    /// Number of keyword matches across name, description and tags.
    pub score: usize,
}

struct Entry {
    tool: RegisteredTool,
    sequence: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_sequence: u64,
}

impl Inner {
    fn ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
    }
}

/// Registry that stores tools keyed by unique name.
///
/// Reads take a shared lock; registration and removal are serialized behind
/// the write lock. Listing and search preserve registration order.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<Inner>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("registered", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if the name is already present.
    pub fn register(
        &self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> RegistryResult<()> {
        self.insert(descriptor, handler, false)
    }

    /// Registers a tool, replacing any existing entry with the same name.
    ///
    /// A replaced entry keeps its original position in listing order.
    pub fn register_with_override(&self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) {
        // Cannot fail when overriding.
        let _ = self.insert(descriptor, handler, true);
    }

    fn insert(
        &self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
        allow_override: bool,
    ) -> RegistryResult<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let name = descriptor.name().to_owned();
        let tool = RegisteredTool {
            descriptor: Arc::new(descriptor),
            handler,
        };

        if let Some(existing) = inner.entries.get_mut(&name) {
            if !allow_override {
                return Err(RegistryError::DuplicateTool { name });
            }
            existing.tool = tool;
            info!(tool = %name, "tool registration overridden");
            return Ok(());
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        debug!(tool = %name, source = %tool.handler.source_type(), "tool registered");
        inner.entries.insert(name, Entry { tool, sequence });
        Ok(())
    }

    /// Removes a tool, returning it if it was registered.
    pub fn unregister(&self, name: &str) -> Option<RegisteredTool> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.entries.remove(name).map(|entry| entry.tool);
        if removed.is_some() {
            debug!(tool = %name, "tool unregistered");
        }
        removed
    }

    /// Removes every tool provided by the named source and returns how many
    /// were dropped. Local tools have no source identifier and are never
    /// matched.
    pub fn remove_source(&self, source_id: &str) -> usize {
        if source_id.is_empty() {
            return 0;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| entry.tool.descriptor.source_id() != source_id);
        let removed = before - inner.entries.len();
        if removed > 0 {
            info!(source = %source_id, removed, "tools removed for source");
        }
        removed
    }

    /// Looks up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when the name is not registered.
    pub fn get(&self, name: &str) -> RegistryResult<RegisteredTool> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(name)
            .map(|entry| entry.tool.clone())
            .ok_or_else(|| RegistryError::UnknownTool {
                name: name.to_owned(),
            })
    }

    /// Returns `true` if a tool with the name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.contains_key(name)
    }

    /// Lists descriptors passing the filter, in registration order.
    #[must_use]
    pub fn list(&self, filter: &ToolFilter) -> Vec<Arc<ToolDescriptor>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .ordered()
            .into_iter()
            .filter(|entry| filter.matches(&entry.tool.descriptor))
            .map(|entry| entry.tool.shared_descriptor())
            .collect()
    }

    /// Ranks tools by keyword matches across name, description and tags.
    ///
    /// The query is split on whitespace and compared case-insensitively. Each
    /// keyword scores one point per field it appears in, with every tag
    /// counting as its own field. Tools scoring zero are omitted; ties keep
    /// registration order.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let keywords: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if keywords.is_empty() {
            return Vec::new();
        }

        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<SearchHit> = inner
            .ordered()
            .into_iter()
            .filter_map(|entry| {
                let score = score(&entry.tool.descriptor, &keywords);
                (score > 0).then(|| SearchHit {
                    descriptor: entry.tool.shared_descriptor(),
                    score,
                })
            })
            .collect();
        // Stable sort keeps registration order for equal scores.
        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits
    }

    /// Names of all registered tools, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .ordered()
            .into_iter()
            .map(|entry| entry.tool.descriptor.name().to_owned())
            .collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn score(descriptor: &ToolDescriptor, keywords: &[String]) -> usize {
    let name = descriptor.name().to_lowercase();
    let description = descriptor.description().to_lowercase();
    let tags: Vec<String> = descriptor.tags().iter().map(|t| t.to_lowercase()).collect();

    keywords
        .iter()
        .map(|keyword| {
            usize::from(name.contains(keyword.as_str()))
                + usize::from(description.contains(keyword.as_str()))
                + tags.iter().filter(|tag| tag.contains(keyword.as_str())).count()
        })
        .sum()
}
