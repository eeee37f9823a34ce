//! Execution side of the tool runtime.
//!
//! [`ToolOrchestrator`] is the entry point used by the conversation layer: it
//! advertises the tools visible under the current policy and runs batches of
//! requested calls. Each call is looked up in the registry, checked by the
//! permission gate and handed to the [`ExecutionEngine`], which validates the
//! arguments and runs the handler under a timeout.

#![warn(missing_docs, clippy::pedantic)]

pub mod engine;
pub mod orchestrator;
pub mod result;
pub mod scheduler;
pub mod validate;

pub use engine::{DEFAULT_TIMEOUT, EngineConfig, ExecutionEngine};
pub use orchestrator::{ToolCall, ToolOrchestrator};
pub use result::{CallError, ToolResult, recovery_suggestions};
pub use scheduler::{SchedulerConfig, TaskScheduler};
pub use validate::Violation;
