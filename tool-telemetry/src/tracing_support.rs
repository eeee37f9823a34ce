//! Structured tracing helpers.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs a global fmt subscriber on stderr, filtered by `RUST_LOG`.
///
/// `default_directive` (for example `"info"` or `"tool_kernel=debug"`) applies
/// when `RUST_LOG` is unset or unparsable. Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialisation_is_a_no_op() {
        let _ = init_tracing("debug");
        assert!(!init_tracing("info"));
    }
}
