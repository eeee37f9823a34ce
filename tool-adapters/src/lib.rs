//! Tool sources.
//!
//! A [`ToolSource`] turns one origin of tools into descriptor and handler
//! pairs: in-process functions ([`LocalSource`]), user extensions living in a
//! directory ([`ExtensionSource`]) or an external JSON-RPC tool server
//! ([`RemoteSource`]). [`bootstrap`] registers a set of sources while keeping
//! one failing source from affecting the others.

#![warn(missing_docs, clippy::pedantic)]

pub mod bootstrap;
mod error;
pub mod extension;
pub mod local;
pub mod remote;
pub mod source;

mod http_client;

pub use bootstrap::{BootstrapReport, SourceFailure, SourceSummary, boot, register_sources};
pub use error::{AdapterError, AdapterResult};
pub use extension::{ExtensionManifest, ExtensionSource};
pub use local::LocalSource;
pub use remote::{JsonRpcServer, RemoteSource, RemoteToolServer};
pub use source::{DiscoveredTool, SourceMetadata, ToolSource};
