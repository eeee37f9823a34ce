use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ConversationId;

/// Per-call ambient information handed to the gate and to handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    conversation_id: Option<ConversationId>,
    #[serde(default)]
    session_data: Map<String, Value>,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    working_directory: Option<PathBuf>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Creates a context stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            conversation_id: None,
            session_data: Map::new(),
            timestamp: Utc::now(),
            working_directory: None,
        }
    }

    /// Associates the context with a conversation.
    #[must_use]
    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    /// Stores an arbitrary session value.
    #[must_use]
    pub fn with_session_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.session_data.insert(key.into(), value);
        self
    }

    /// Sets the directory relative paths are resolved against.
    #[must_use]
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Conversation the call belongs to, if any.
    #[must_use]
    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    /// Session key/value data.
    #[must_use]
    pub fn session_data(&self) -> &Map<String, Value> {
        &self.session_data
    }

    /// When the context was created.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Working directory, if one was set.
    #[must_use]
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Resolves `path` against the working directory when it is relative.
    #[must_use]
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match &self.working_directory {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_paths_against_working_directory() {
        let ctx = ExecutionContext::new().with_working_directory("/srv/data");
        assert_eq!(ctx.resolve_path("notes.txt"), PathBuf::from("/srv/data/notes.txt"));
        assert_eq!(ctx.resolve_path("/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(ExecutionContext::new().resolve_path("a"), PathBuf::from("a"));
    }

    #[test]
    fn carries_session_values() {
        let id = ConversationId::random();
        let ctx = ExecutionContext::new()
            .with_conversation(id)
            .with_session_value("user", Value::from("ada"));
        assert_eq!(ctx.conversation_id(), Some(id));
        assert_eq!(ctx.session_data()["user"], "ada");
    }
}
