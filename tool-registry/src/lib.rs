//! Tool catalog and the pieces that feed it.
//!
//! The [`ToolRegistry`] maps unique tool names to a descriptor plus a
//! [`ToolHandler`]. Descriptors for in-process functions are produced by the
//! [`schema`] deriver, usually through the `#[tool]` attribute which emits a
//! [`LocalTool`] binding ready to be registered explicitly at startup.

#![warn(missing_docs, clippy::pedantic)]

pub mod binding;
pub mod handler;
pub mod registry;
pub mod schema;

pub use binding::{LocalTool, ToolOptions, take_argument, take_argument_or, to_output};
pub use handler::{HandlerError, HandlerResult, LocalHandler, ToolHandler};
pub use registry::{
    RegisteredTool, RegistryError, RegistryResult, SearchHit, ToolFilter, ToolRegistry,
};
pub use schema::{CallableSignature, DerivedSchema, FormalParameter};
/// Attribute generating a [`LocalTool`] constructor for a function.
pub use tool_macros::tool;

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
    pub use tool_primitives;
}
