//! Tool execution runtime for AI assistants.
//!
//! Depend on this crate via `cargo add toolgate`. It bundles the runtime
//! crates behind feature flags, and with the default features [`Runtime`]
//! wires a configured registry, permission gate and orchestrator in one call.

#![warn(missing_docs, clippy::pedantic)]

/// Shared descriptors, context and permission vocabulary.
pub use tool_primitives as primitives;

/// Tool catalog, handler capability and schema derivation.
pub use tool_registry as registry;

/// Attribute generating a registry binding for a function.
///
/// The expansion names `tool_registry` directly, so crates using it also
/// depend on `tool-registry`.
pub use tool_registry::tool;

/// Validation, timed execution and orchestration (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use tool_kernel as kernel;

/// Local, extension and remote tool sources (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use tool_adapters as adapters;

/// Permission gate and approval requesters (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use tool_policy as policy;

/// Tracing setup and execution statistics (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use tool_telemetry as telemetry;

/// Layered configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use tool_config as config;

/// Built-in text and file tools (enabled by `builtins` feature).
#[cfg(feature = "builtins")]
pub use tool_builtins as builtins;

#[cfg(all(feature = "kernel", feature = "adapters", feature = "builtins"))]
mod runtime;

#[cfg(all(feature = "kernel", feature = "adapters", feature = "builtins"))]
pub use runtime::Runtime;
