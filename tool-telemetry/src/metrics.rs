//! Lock-free execution counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// How a handler invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Returned a value.
    Succeeded,
    /// Returned an error or panicked.
    Failed,
    /// Exceeded its time budget.
    TimedOut,
}

/// Why a call was rejected before its handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The permission gate denied it.
    Denied,
    /// Unknown tool or invalid arguments.
    Invalid,
}

/// Shared counters updated by the engine and orchestrator.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    denied: AtomicU64,
    invalid: AtomicU64,
    execution_micros: AtomicU64,
}

impl ExecutionStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a handler invocation.
    pub fn record_execution(&self, outcome: ExecutionOutcome, elapsed: Duration) {
        let counter = match outcome {
            ExecutionOutcome::Succeeded => &self.succeeded,
            ExecutionOutcome::Failed => &self.failed,
            ExecutionOutcome::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.execution_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Records a call that never reached its handler.
    pub fn record_rejection(&self, rejection: Rejection) {
        let counter = match rejection {
            Rejection::Denied => &self.denied,
            Rejection::Invalid => &self.invalid,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            execution_time: Duration::from_micros(self.execution_micros.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time copy of [`ExecutionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSnapshot {
    /// Handler returned a value.
    pub succeeded: u64,
    /// Handler returned an error.
    pub failed: u64,
    /// Handler exceeded its timeout.
    pub timed_out: u64,
    /// Permission gate refused the call.
    pub denied: u64,
    /// Unknown tool or invalid arguments.
    pub invalid: u64,
    /// Cumulative time spent in handlers.
    #[serde(serialize_with = "serialize_millis", rename = "execution_time_ms")]
    pub execution_time: Duration,
}

impl ExecutionSnapshot {
    /// Every recorded call.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.executed() + self.denied + self.invalid
    }

    /// Calls whose handler actually ran.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out
    }

    /// Share of all calls that succeeded, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.succeeded as f64 / total as f64,
        }
    }

    /// Mean handler time over executed calls.
    #[must_use]
    pub fn average_execution_time(&self) -> Duration {
        match u32::try_from(self.executed()) {
            Ok(0) => Duration::ZERO,
            Ok(executed) => self.execution_time / executed,
            Err(_) => Duration::from_secs_f64(
                self.execution_time.as_secs_f64() / self.executed() as f64,
            ),
        }
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u128(duration.as_millis())
}
