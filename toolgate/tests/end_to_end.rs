use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tool_registry::tool;
use toolgate::Runtime;
use toolgate::config::{RemoteServerConfig, RemoteTransportConfig, ToolsConfig};
use toolgate::kernel::{ToolCall, ToolResult};
use toolgate::policy::{Approval, ApprovalRequester, ScriptedApprover};
use toolgate::primitives::{ExecutionContext, PolicyMode, SourceType, ToolArguments};
use toolgate::registry::{LocalHandler, LocalTool, RegistryError};

/// Adds two integers.
///
/// # Arguments
/// * `a` - left operand
/// * `b` - right operand
#[tool(category = "general", tags = "math")]
fn add(a: i64, b: i64) -> i64 {
    a + b
}

/// Always fails.
#[tool]
fn explode() -> Result<i64, String> {
    Err("boom".to_owned())
}

/// Never finishes within any reasonable budget.
#[tool]
async fn stall() -> i64 {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    0
}

/// Stores a note.
#[tool(permission = "elevated")]
fn remember(note: String) -> String {
    note
}

/// Erases everything.
#[tool(permission = "dangerous")]
fn wipe() -> bool {
    true
}

fn local_tools() -> Vec<LocalTool> {
    vec![
        add_tool().unwrap(),
        explode_tool().unwrap(),
        stall_tool().unwrap(),
        remember_tool().unwrap(),
        wipe_tool().unwrap(),
    ]
}

fn args(value: Value) -> ToolArguments {
    value.as_object().cloned().unwrap()
}

fn call(name: &str, value: Value) -> ToolCall {
    ToolCall::new(name, args(value))
}

fn requester(approver: &Arc<ScriptedApprover>) -> Arc<dyn ApprovalRequester> {
    Arc::clone(approver) as Arc<dyn ApprovalRequester>
}

async fn runtime(config: &ToolsConfig, approver: &Arc<ScriptedApprover>) -> Runtime {
    Runtime::start_with(config, requester(approver), local_tools()).await
}

fn outcomes(results: &[ToolResult]) -> Vec<(&str, Option<&str>)> {
    results
        .iter()
        .map(|result| (result.tool_name(), result.error_kind()))
        .collect()
}

#[tokio::test]
async fn local_tool_round_trip() {
    let approver = Arc::new(ScriptedApprover::always(Approval::Deny));
    let runtime = runtime(&ToolsConfig::default(), &approver).await;

    let results = runtime
        .orchestrator()
        .execute_requested_tools(
            vec![call("add", json!({"a": 2, "b": 3})).with_id("call-1")],
            &ExecutionContext::new(),
        )
        .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    assert_eq!(results[0].result(), Some(&json!(5)));
    assert_eq!(results[0].call_id(), Some("call-1"));
    assert_eq!(approver.ask_count(), 0);
}

#[tokio::test]
async fn integral_floats_bind_to_integer_parameters() {
    let approver = Arc::new(ScriptedApprover::always(Approval::Deny));
    let runtime = runtime(&ToolsConfig::default(), &approver).await;
    let orchestrator = runtime.orchestrator();
    let context = ExecutionContext::new();

    let whole = orchestrator
        .execute_tool(call("add", json!({"a": 2.0, "b": 3})), &context)
        .await;
    assert_eq!(whole.result(), Some(&json!(5)));

    let fractional = orchestrator
        .execute_tool(call("add", json!({"a": 2.5, "b": 3})), &context)
        .await;
    assert_eq!(fractional.error_kind(), Some("validation"));
}

#[tokio::test]
async fn batch_results_keep_request_order_and_isolate_failures() {
    let approver = Arc::new(ScriptedApprover::always(Approval::Deny));
    let runtime = runtime(&ToolsConfig::default(), &approver).await;

    let results = runtime
        .orchestrator()
        .execute_requested_tools(
            vec![
                call("add", json!({"a": 1, "b": 1})),
                call("explode", json!({})),
                call("missing", json!({})),
                call("add", json!({"a": "one"})),
                call("add", json!({"a": 20, "b": 22})),
            ],
            &ExecutionContext::new(),
        )
        .await;

    assert_eq!(
        outcomes(&results),
        [
            ("add", None),
            ("explode", Some("execution")),
            ("missing", Some("not_found")),
            ("add", Some("validation")),
            ("add", None),
        ]
    );
    assert_eq!(results[1].error(), Some("tool `explode` failed: boom"));
    assert_eq!(results[4].result(), Some(&json!(42)));

    let stats = runtime.orchestrator().stats();
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.invalid, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out_without_affecting_siblings() {
    let config = ToolsConfig {
        execution_timeout_secs: 2,
        ..ToolsConfig::default()
    };
    let approver = Arc::new(ScriptedApprover::always(Approval::Deny));
    let runtime = Runtime::start_with(
        &config,
        requester(&approver),
        vec![add_tool().unwrap(), stall_tool().unwrap()],
    )
    .await;

    let results = runtime
        .orchestrator()
        .execute_requested_tools(
            vec![call("stall", json!({})), call("add", json!({"a": 1, "b": 2}))],
            &ExecutionContext::new(),
        )
        .await;

    assert_eq!(outcomes(&results), [("stall", Some("timeout")), ("add", None)]);
    assert_eq!(results[0].error(), Some("tool `stall` failed: timed out after 2s"));
    assert!(!results[0].recovery_suggestions().is_empty());
}

#[tokio::test]
async fn elevated_calls_prompt_once_per_distinct_call() {
    let approver = Arc::new(ScriptedApprover::always(Approval::Approve));
    let runtime = runtime(&ToolsConfig::default(), &approver).await;
    let orchestrator = runtime.orchestrator();
    let context = ExecutionContext::new();

    let results = orchestrator
        .execute_requested_tools(
            vec![
                call("remember", json!({"note": "milk"})),
                call("remember", json!({"note": "milk"})),
            ],
            &context,
        )
        .await;
    assert!(results.iter().all(ToolResult::is_success));
    assert_eq!(approver.ask_count(), 1);

    let other = orchestrator
        .execute_tool(call("remember", json!({"note": "eggs"})), &context)
        .await;
    assert!(other.is_success());
    assert_eq!(approver.ask_count(), 2);
}

#[tokio::test]
async fn dangerous_tools_need_the_allow_list_in_every_mode() {
    for mode in [PolicyMode::Auto, PolicyMode::Prompt, PolicyMode::Deny] {
        let config = ToolsConfig {
            permission_mode: mode,
            ..ToolsConfig::default()
        };
        let approver = Arc::new(ScriptedApprover::always(Approval::ApproveAndRemember));
        let runtime = runtime(&config, &approver).await;
        let orchestrator = runtime.orchestrator();
        let context = ExecutionContext::new();

        let denied = orchestrator.execute_tool(call("wipe", json!({})), &context).await;
        assert_eq!(denied.error_kind(), Some("permission_denied"), "mode {mode:?}");
        assert_eq!(approver.ask_count(), 0);
        assert!(
            !orchestrator
                .get_available_tools(&context)
                .iter()
                .any(|descriptor| descriptor.name() == "wipe")
        );

        orchestrator.gate().allow_dangerous("wipe");
        let allowed = orchestrator.execute_tool(call("wipe", json!({})), &context).await;
        assert_eq!(allowed.result(), Some(&json!(true)), "mode {mode:?}");
    }

    let config = ToolsConfig {
        dangerous_allow_list: vec!["wipe".to_owned()],
        ..ToolsConfig::default()
    };
    let approver = Arc::new(ScriptedApprover::always(Approval::Deny));
    let runtime = runtime(&config, &approver).await;
    let allowed = runtime
        .orchestrator()
        .execute_tool(call("wipe", json!({})), &ExecutionContext::new())
        .await;
    assert!(allowed.is_success());
}

#[tokio::test]
async fn duplicate_names_are_rejected_unless_overridden() {
    let approver = Arc::new(ScriptedApprover::always(Approval::Deny));
    let runtime = runtime(&ToolsConfig::default(), &approver).await;
    let registry = runtime.orchestrator().registry();

    let err = add_tool().unwrap().register(registry).unwrap_err();
    assert_eq!(
        err,
        RegistryError::DuplicateTool {
            name: "add".to_owned()
        }
    );

    let (descriptor, _) = add_tool().unwrap().into_parts();
    registry.register_with_override(
        descriptor,
        Arc::new(LocalHandler::new(|_args, _ctx| async { Ok(json!("replaced")) })),
    );
    let result = runtime
        .orchestrator()
        .execute_tool(call("add", json!({"a": 1, "b": 2})), &ExecutionContext::new())
        .await;
    assert_eq!(result.result(), Some(&json!("replaced")));
}

#[tokio::test]
async fn unreachable_remote_server_leaves_local_tools_available() {
    let config = ToolsConfig {
        remote_servers: vec![RemoteServerConfig::new(
            "weather",
            RemoteTransportConfig::Stdio {
                command: "/nonexistent/weather-server".to_owned(),
                args: Vec::new(),
                env: BTreeMap::new(),
            },
        )],
        ..ToolsConfig::default()
    };
    let approver = Arc::new(ScriptedApprover::always(Approval::Deny));
    let runtime = runtime(&config, &approver).await;

    let report = runtime.report();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].source_id, "weather");

    let visible: Vec<String> = runtime
        .orchestrator()
        .get_available_tools(&ExecutionContext::new())
        .iter()
        .map(|descriptor| descriptor.name().to_owned())
        .collect();
    assert_eq!(visible, ["add", "explode", "stall", "remember"]);
}

#[tokio::test]
async fn builtin_modules_follow_configuration() {
    let config = ToolsConfig {
        enabled_builtin_modules: vec!["text".to_owned()],
        ..ToolsConfig::default()
    };
    let approver = Arc::new(ScriptedApprover::always(Approval::Deny));
    let runtime = Runtime::start(&config, requester(&approver)).await.unwrap();

    let specs = runtime.orchestrator().function_specs(&ExecutionContext::new());
    let names: Vec<&str> = specs.iter().map(|spec| spec.name.as_str()).collect();
    assert_eq!(names, ["transform_text_case", "analyze_text", "count_occurrences"]);

    let result = runtime
        .orchestrator()
        .execute_tool(
            call("transform_text_case", json!({"text": "hello world", "case_type": "title"})),
            &ExecutionContext::new(),
        )
        .await;
    assert_eq!(result.result(), Some(&json!("Hello World")));
}

#[cfg(unix)]
#[tokio::test]
async fn extension_tools_run_as_child_processes() {
    use std::os::unix::fs::PermissionsExt;

    let extensions = tempfile::tempdir().unwrap();
    let root = extensions.path().join("greeter");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(
        root.join("manifest.json"),
        json!({
            "name": "greeter",
            "command": "./run.sh",
            "tools": [{
                "name": "greet",
                "description": "Greets the caller",
                "permission_level": "safe",
                "parameters": [{"name": "who", "type": "string"}],
            }],
        })
        .to_string(),
    )
    .unwrap();
    let script = root.join("run.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\nread -r request\nprintf '{\"ok\": true, \"result\": \"hello from %s\"}\\n' \"$1\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = ToolsConfig {
        extensions_dir: Some(extensions.path().to_path_buf()),
        ..ToolsConfig::default()
    };
    let approver = Arc::new(ScriptedApprover::always(Approval::Deny));
    let runtime = runtime(&config, &approver).await;

    let greet = runtime.orchestrator().registry().get("greet").unwrap();
    assert_eq!(greet.descriptor().source_type(), SourceType::Extension);
    assert_eq!(greet.descriptor().source_id(), "greeter");

    let result = runtime
        .orchestrator()
        .execute_tool(call("greet", json!({"who": "ada"})), &ExecutionContext::new())
        .await;
    assert_eq!(result.result(), Some(&json!("hello from greet")));

    let invalid = runtime
        .orchestrator()
        .execute_tool(call("greet", json!({})), &ExecutionContext::new())
        .await;
    assert_eq!(invalid.error_kind(), Some("validation"));
}
