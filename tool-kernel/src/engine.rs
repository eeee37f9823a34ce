//! Validated, time-boxed handler invocation.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinError;
use tokio::time::Instant;
use tool_primitives::{ExecutionContext, ToolArguments, ToolDescriptor};
use tool_registry::ToolHandler;
use tool_telemetry::{ExecutionOutcome, ExecutionStats, Rejection};
use tracing::{debug, error};

use crate::result::{CallError, ToolResult};
use crate::validate;

/// Default per-call time budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    timeout: Duration,
}

impl EngineConfig {
    /// Uses the supplied per-call timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Per-call timeout.
    #[must_use]
    pub const fn timeout(self) -> Duration {
        self.timeout
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

/// Runs one handler call: validate, invoke under a timeout, wrap the outcome.
///
/// Handler errors, panics and timeouts never escape; they become failed
/// [`ToolResult`]s. Calls are never retried.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    config: EngineConfig,
    stats: Arc<ExecutionStats>,
}

impl ExecutionEngine {
    /// Creates an engine with fresh statistics.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stats: Arc::new(ExecutionStats::new()),
        }
    }

    /// Records into a shared statistics instance.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<ExecutionStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Statistics this engine records into.
    #[must_use]
    pub fn stats(&self) -> &Arc<ExecutionStats> {
        &self.stats
    }

    /// Executes one call and reports its outcome.
    pub async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
        arguments: ToolArguments,
        context: &ExecutionContext,
    ) -> ToolResult {
        let started = Instant::now();
        let outcome = self.run(descriptor, handler, arguments, context).await;
        ToolResult::from_outcome(descriptor.name(), outcome, started.elapsed())
    }

    /// Executes one call, returning the raw value or the typed failure.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Validation`] without invoking the handler when the
    /// arguments do not match the schema, [`CallError::Timeout`] when the
    /// handler exceeds the configured budget, and [`CallError::Execution`]
    /// when it fails or panics.
    pub async fn run(
        &self,
        descriptor: &ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
        arguments: ToolArguments,
        context: &ExecutionContext,
    ) -> Result<Value, CallError> {
        let name = descriptor.name();
        let arguments = match validate::prepare(descriptor.parameters(), arguments) {
            Ok(arguments) => arguments,
            Err(violations) => {
                self.stats.record_rejection(Rejection::Invalid);
                debug!(tool = %name, violations = violations.len(), "arguments rejected");
                return Err(CallError::Validation {
                    name: name.to_owned(),
                    violations,
                });
            }
        };

        let started = Instant::now();
        let context = context.clone();
        let mut task = tokio::spawn(async move { handler.execute(arguments, &context).await });

        let timeout = self.config.timeout;
        let joined = tokio::time::timeout(timeout, &mut task).await;
        let elapsed = started.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match joined {
            Ok(Ok(Ok(value))) => {
                self.stats
                    .record_execution(ExecutionOutcome::Succeeded, elapsed);
                debug!(tool = %name, elapsed_ms, "tool call succeeded");
                Ok(value)
            }
            Ok(Ok(Err(err))) => {
                self.stats.record_execution(ExecutionOutcome::Failed, elapsed);
                error!(tool = %name, elapsed_ms, error = %err, "tool call failed");
                Err(CallError::Execution {
                    name: name.to_owned(),
                    reason: err.to_string(),
                })
            }
            Ok(Err(join_error)) => {
                self.stats.record_execution(ExecutionOutcome::Failed, elapsed);
                let reason = join_failure(join_error);
                error!(tool = %name, elapsed_ms, error = %reason, "tool call aborted");
                Err(CallError::Execution {
                    name: name.to_owned(),
                    reason,
                })
            }
            Err(_) => {
                task.abort();
                self.stats
                    .record_execution(ExecutionOutcome::TimedOut, elapsed);
                error!(tool = %name, timeout_ms = timeout.as_millis(), "tool call timed out");
                Err(CallError::Timeout {
                    name: name.to_owned(),
                    timeout,
                })
            }
        }
    }
}

fn join_failure(error: JoinError) -> String {
    if error.is_panic() {
        format!("handler panicked: {}", panic_message(error.into_panic().as_ref()))
    } else {
        "handler task was cancelled".to_owned()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tool_primitives::{ParamType, ParameterSchema, ParameterSpec};
    use tool_registry::{HandlerError, LocalHandler, take_argument};

    fn add_descriptor() -> ToolDescriptor {
        ToolDescriptor::builder("add")
            .parameters(
                ParameterSchema::from_specs([
                    ParameterSpec::required("a", ParamType::Integer),
                    ParameterSpec::optional("b", ParamType::Integer, json!(10)),
                ])
                .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn add_handler() -> Arc<dyn ToolHandler> {
        Arc::new(LocalHandler::new(|mut args, _ctx| async move {
            let a: i64 = take_argument(&mut args, "a")?;
            let b: i64 = take_argument(&mut args, "b")?;
            Ok(json!(a + b))
        }))
    }

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn fills_defaults_before_invoking() {
        let engine = ExecutionEngine::default();
        let result = engine
            .execute(&add_descriptor(), add_handler(), args(json!({"a": 2})), &ExecutionContext::new())
            .await;
        assert!(result.is_success());
        assert_eq!(result.result(), Some(&json!(12)));
        assert_eq!(engine.stats().snapshot().succeeded, 1);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler: Arc<dyn ToolHandler> = Arc::new(LocalHandler::new(move |_args, _ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Value::Null) }
        }));

        let engine = ExecutionEngine::default();
        let err = engine
            .run(&add_descriptor(), handler, args(json!({"a": "two"})), &ExecutionContext::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "validation");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.stats().snapshot().invalid, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_handler_times_out() {
        let descriptor = ToolDescriptor::builder("hang").build().unwrap();
        let handler: Arc<dyn ToolHandler> = Arc::new(LocalHandler::new(|_args, _ctx| async {
            std::future::pending::<()>().await;
            Ok(Value::Null)
        }));

        let engine = ExecutionEngine::new(EngineConfig::new(Duration::from_secs(5)));
        let started = Instant::now();
        let result = engine
            .execute(&descriptor, handler, ToolArguments::new(), &ExecutionContext::new())
            .await;

        assert!(!result.is_success());
        assert_eq!(result.error_kind(), Some("timeout"));
        assert!(result.error().unwrap().contains("timed out after 5s"));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_millis(5_100));
        assert_eq!(engine.stats().snapshot().timed_out, 1);
    }

    #[tokio::test]
    async fn handler_errors_and_panics_become_failures() {
        let descriptor = ToolDescriptor::builder("boom").build().unwrap();
        let engine = ExecutionEngine::default();

        let failing: Arc<dyn ToolHandler> = Arc::new(LocalHandler::new(|_args, _ctx| async {
            Err(HandlerError::failed("disk full"))
        }));
        let result = engine
            .execute(&descriptor, failing, ToolArguments::new(), &ExecutionContext::new())
            .await;
        assert_eq!(result.error(), Some("tool `boom` failed: disk full"));

        let panicking: Arc<dyn ToolHandler> = Arc::new(LocalHandler::new(|args, _ctx| async move {
            assert!(!args.is_empty(), "kaboom");
            Ok(Value::Null)
        }));
        let result = engine
            .execute(&descriptor, panicking, ToolArguments::new(), &ExecutionContext::new())
            .await;
        assert_eq!(result.error_kind(), Some("execution"));
        assert!(result.error().unwrap().contains("handler panicked: kaboom"));
        assert_eq!(engine.stats().snapshot().failed, 2);
    }
}
