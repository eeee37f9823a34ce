use serde_json::{Value, json};
use tool_primitives::{ExecutionContext, ParamType, PermissionLevel, ToolArguments, ToolCategory};
use tool_registry::{HandlerError, ToolRegistry, tool};

type LookupResult<T> = Result<T, String>;

/// Repeats a word.
///
/// # Arguments
/// * `word` - text to repeat
/// * `times` - how often
/// * `separator` - placed between repetitions
#[tool(category = "productivity", tags = "text, demo")]
fn repeat(
    word: String,
    #[tool(default = 2_u32)] times: u32,
    #[tool(default = "-")] separator: String,
) -> String {
    vec![word; times as usize].join(&separator)
}

/// Finds a user id.
#[tool(name = "find_user", permission = "elevated")]
async fn lookup(user: String) -> LookupResult<u64> {
    match user.as_str() {
        "ada" => Ok(1815),
        other => Err(format!("no user named {other}")),
    }
}

/// Returns a list, not a result.
#[tool]
fn wrapped() -> Option<Vec<u8>> {
    Some(vec![1, 2])
}

fn args(value: Value) -> ToolArguments {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn parameter_defaults_become_optional_schema_entries() {
    let tool = repeat_tool().unwrap();
    let descriptor = tool.descriptor();
    assert_eq!(descriptor.category(), ToolCategory::Productivity);
    assert!(descriptor.tags().contains("demo"));

    let params = descriptor.parameters();
    let word = params.get("word").unwrap();
    assert!(word.is_required());
    assert_eq!(word.description(), "text to repeat");
    let times = params.get("times").unwrap();
    assert!(!times.is_required());
    assert_eq!(times.param_type(), &ParamType::Integer);
    assert_eq!(times.default_value(), Some(&json!(2)));
    assert_eq!(params.get("separator").unwrap().default_value(), Some(&json!("-")));

    let registry = ToolRegistry::new();
    tool.register(&registry).unwrap();
    let handler = registry.get("repeat").unwrap().handler();
    let context = ExecutionContext::new();
    assert_eq!(
        handler.execute(args(json!({"word": "ho"})), &context).await.unwrap(),
        json!("ho-ho")
    );
    assert_eq!(
        handler
            .execute(args(json!({"word": "ha", "times": 3, "separator": " "})), &context)
            .await
            .unwrap(),
        json!("ha ha ha")
    );
}

#[tokio::test]
async fn result_aliases_surface_errors_as_failures() {
    let tool = lookup_tool().unwrap();
    assert_eq!(tool.descriptor().name(), "find_user");
    assert_eq!(tool.descriptor().permission_level(), PermissionLevel::Elevated);

    let (_, handler) = tool.into_parts();
    let context = ExecutionContext::new();
    assert_eq!(
        handler.execute(args(json!({"user": "ada"})), &context).await.unwrap(),
        json!(1815)
    );
    assert_eq!(
        handler.execute(args(json!({"user": "bob"})), &context).await.unwrap_err(),
        HandlerError::failed("no user named bob")
    );
}

#[tokio::test]
async fn other_wrappers_are_returned_as_values() {
    let (_, handler) = wrapped_tool().unwrap().into_parts();
    let output = handler
        .execute(ToolArguments::new(), &ExecutionContext::new())
        .await
        .unwrap();
    assert_eq!(output, json!([1, 2]));
}
