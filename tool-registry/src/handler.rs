//! The executable capability behind a tool.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tool_primitives::{ExecutionContext, SourceType, ToolArguments};

/// Result alias for handler invocations.
pub type HandlerResult<T> = Result<T, HandlerError>;

type LocalFuture = Pin<Box<dyn Future<Output = HandlerResult<Value>> + Send>>;
type LocalFn = dyn Fn(ToolArguments, ExecutionContext) -> LocalFuture + Send + Sync;

/// Failure reported by a handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// The tool ran and reported an error.
    #[error("{reason}")]
    Failed {
        /// Message produced by the tool.
        reason: String,
    },

    /// Arguments could not be converted into the handler's native types.
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// Conversion failure details.
        reason: String,
    },

    /// The handler could not reach the process or server that runs the tool.
    #[error("transport failure: {reason}")]
    Transport {
        /// Transport failure details.
        reason: String,
    },
}

impl HandlerError {
    /// Creates a [`HandlerError::Failed`].
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Creates a [`HandlerError::InvalidArguments`].
    #[must_use]
    pub fn invalid_arguments(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }

    /// Creates a [`HandlerError::Transport`].
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// One operation shared by local, extension and remote tools.
///
/// The execution engine only ever talks to this trait, so it never needs to
/// know where a tool actually runs.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Kind of source backing this handler.
    fn source_type(&self) -> SourceType;

    /// Runs the tool with already-validated arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the tool fails or cannot be reached.
    async fn execute(
        &self,
        arguments: ToolArguments,
        context: &ExecutionContext,
    ) -> HandlerResult<Value>;
}

/// Handler that calls an in-process function.
#[derive(Clone)]
pub struct LocalHandler {
    call: Arc<LocalFn>,
}

impl std::fmt::Debug for LocalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalHandler").finish_non_exhaustive()
    }
}

impl LocalHandler {
    /// Wraps an async function.
    #[must_use]
    pub fn new<F, Fut>(function: F) -> Self
    where
        F: Fn(ToolArguments, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Value>> + Send + 'static,
    {
        Self {
            call: Arc::new(move |arguments, context| Box::pin(function(arguments, context))),
        }
    }

    /// Wraps a synchronous function that runs on tokio's blocking pool.
    #[must_use]
    pub fn blocking<F>(function: F) -> Self
    where
        F: Fn(ToolArguments, ExecutionContext) -> HandlerResult<Value> + Send + Sync + 'static,
    {
        let function = Arc::new(function);
        Self::new(move |arguments, context| {
            let function = Arc::clone(&function);
            async move {
                tokio::task::spawn_blocking(move || function(arguments, context))
                    .await
                    .map_err(|err| HandlerError::failed(format!("blocking tool task failed: {err}")))?
            }
        })
    }
}

#[async_trait]
impl ToolHandler for LocalHandler {
    fn source_type(&self) -> SourceType {
        SourceType::Local
    }

    async fn execute(
        &self,
        arguments: ToolArguments,
        context: &ExecutionContext,
    ) -> HandlerResult<Value> {
        (self.call)(arguments, context.clone()).await
    }
}
