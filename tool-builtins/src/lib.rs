//! Tools shipped with toolgate.
//!
//! Tools are grouped into modules that can be switched on individually
//! through `enabled_builtin_modules`. [`tools_for`] returns the bindings of
//! the enabled modules as an explicit, ordered list ready for the local
//! source.

#![warn(missing_docs, clippy::pedantic)]

pub mod files;
pub mod text;

use tool_registry::LocalTool;
use tracing::warn;

/// Names of every built-in module, in registration order.
pub const MODULES: [&str; 2] = ["text", "files"];

/// Bindings of one module, or `None` for an unknown name.
///
/// # Errors
///
/// Returns an error if a derived descriptor is invalid.
pub fn module(name: &str) -> Option<tool_primitives::Result<Vec<LocalTool>>> {
    match name {
        "text" => Some(text::tools()),
        "files" => Some(files::tools()),
        _ => None,
    }
}

/// Bindings of the enabled modules.
///
/// Modules are returned in [`MODULES`] order regardless of the order of
/// `enabled`. Unknown names are logged and ignored.
///
/// # Errors
///
/// Returns an error if a derived descriptor is invalid.
pub fn tools_for<S>(enabled: &[S]) -> tool_primitives::Result<Vec<LocalTool>>
where
    S: AsRef<str>,
{
    for name in enabled {
        if !MODULES.contains(&name.as_ref()) {
            warn!(module = %name.as_ref(), "unknown built-in tool module");
        }
    }

    let mut tools = Vec::new();
    for name in MODULES {
        if enabled.iter().any(|enabled| enabled.as_ref() == name) {
            if let Some(module) = module(name) {
                tools.extend(module?);
            }
        }
    }
    Ok(tools)
}
