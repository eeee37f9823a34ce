//! Observability utilities for the tool runtime.

#![warn(missing_docs, clippy::pedantic)]

pub mod metrics;
pub mod tracing_support;

pub use metrics::{ExecutionOutcome, ExecutionSnapshot, ExecutionStats, Rejection};
pub use tracing_support::init_tracing;
