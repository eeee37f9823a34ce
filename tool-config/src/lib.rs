//! Configuration for the tool runtime.
//!
//! [`ToolsConfig`] is the typed view consumed by the entry point;
//! [`ConfigLoader`] layers defaults, an optional file and environment
//! variables on top of each other before validating the result.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use schema::{RemoteServerConfig, RemoteTransportConfig, ToolsConfig};
