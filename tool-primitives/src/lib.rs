//! Core shared types for the toolgate runtime.
//!
//! Everything that crosses a crate boundary lives here: the static
//! [`ToolDescriptor`] advertised for each tool, the permission vocabulary, and
//! the [`ExecutionContext`] handed to every handler invocation.

#![warn(missing_docs, clippy::pedantic)]

mod context;
mod descriptor;
mod error;
mod ids;
mod permission;

/// Per-call context passed to handlers.
pub use context::ExecutionContext;
/// Tool descriptors and parameter schemas.
pub use descriptor::{
    FunctionSpec, ParamType, ParameterSchema, ParameterSpec, SourceType, ToolArguments,
    ToolCategory, ToolDescriptor, ToolDescriptorBuilder, ToolExample,
};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Conversation identifiers.
pub use ids::ConversationId;
/// Risk levels and policy modes.
pub use permission::{PermissionLevel, PolicyMode};
