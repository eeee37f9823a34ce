//! Bindings between in-process functions and the registry.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tool_primitives::{
    PermissionLevel, ToolArguments, ToolCategory, ToolDescriptor, ToolExample,
};

use crate::handler::{HandlerError, HandlerResult, LocalHandler, ToolHandler};
use crate::registry::{RegistryResult, ToolRegistry};
use crate::schema::CallableSignature;

/// Descriptor overrides supplied alongside a derived signature.
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    /// Registered name; defaults to the callable name.
    pub name: Option<String>,
    /// Description; defaults to the documentation summary.
    pub description: Option<String>,
    /// Permission level.
    pub permission: PermissionLevel,
    /// Catalog category.
    pub category: ToolCategory,
    /// Search tags.
    pub tags: Vec<String>,
    /// Usage examples.
    pub examples: Vec<ToolExample>,
}

impl ToolOptions {
    /// Overrides the registered name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the description.
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the permission level.
    #[must_use]
    pub fn permission(mut self, permission: PermissionLevel) -> Self {
        self.permission = permission;
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Adds a usage example.
    #[must_use]
    pub fn example(mut self, example: ToolExample) -> Self {
        self.examples.push(example);
        self
    }
}

/// Declarative binding for an in-process tool, as returned by `#[tool]`.
#[derive(Clone)]
pub struct LocalTool {
    descriptor: ToolDescriptor,
    handler: LocalHandler,
    flagged: Vec<String>,
}

impl std::fmt::Debug for LocalTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTool")
            .field("name", &self.descriptor.name())
            .field("flagged", &self.flagged)
            .finish_non_exhaustive()
    }
}

impl LocalTool {
    /// Pairs an explicit descriptor with a handler.
    #[must_use]
    pub fn new(descriptor: ToolDescriptor, handler: LocalHandler) -> Self {
        Self {
            descriptor,
            handler,
            flagged: Vec::new(),
        }
    }

    /// Derives the descriptor from a reflected signature.
    ///
    /// # Errors
    ///
    /// Returns [`tool_primitives::Error::InvalidDescriptor`] when the resulting
    /// name is invalid.
    pub fn from_signature(
        signature: &CallableSignature,
        options: ToolOptions,
        handler: LocalHandler,
    ) -> tool_primitives::Result<Self> {
        let derived = signature.derive();
        let name = options.name.unwrap_or_else(|| signature.name.clone());
        let description = options.description.unwrap_or(derived.summary);

        let mut builder = ToolDescriptor::builder(name)
            .description(description)
            .parameters(derived.parameters)
            .permission(options.permission)
            .category(options.category)
            .tags(options.tags);
        for example in options.examples {
            builder = builder.example(example);
        }

        Ok(Self {
            descriptor: builder.build()?,
            handler,
            flagged: derived.flagged,
        })
    }

    /// Returns the descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Parameters whose type could not be mapped and fell back to `any`.
    #[must_use]
    pub fn flagged_parameters(&self) -> &[String] {
        &self.flagged
    }

    /// Splits the binding into what the registry stores.
    #[must_use]
    pub fn into_parts(self) -> (ToolDescriptor, Arc<dyn ToolHandler>) {
        (self.descriptor, Arc::new(self.handler))
    }

    /// Registers the binding with the provided registry.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::RegistryError::DuplicateTool`] if a tool with the
    /// same name has already been registered.
    pub fn register(self, registry: &ToolRegistry) -> RegistryResult<()> {
        let (descriptor, handler) = self.into_parts();
        registry.register(descriptor, handler)
    }
}

/// Removes `name` from the arguments and deserializes it.
///
/// An absent argument is treated as `null`, so `Option<T>` targets read as
/// `None`.
///
/// # Errors
///
/// Returns [`HandlerError::InvalidArguments`] when the value has the wrong shape.
pub fn take_argument<T>(arguments: &mut ToolArguments, name: &str) -> HandlerResult<T>
where
    T: DeserializeOwned,
{
    let value = arguments.remove(name).unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|err| HandlerError::invalid_arguments(format!("`{name}`: {err}")))
}

/// Like [`take_argument`], but falls back to `default` when the argument is
/// absent or `null`.
///
/// # Errors
///
/// Returns [`HandlerError::InvalidArguments`] when the value has the wrong shape.
pub fn take_argument_or<T, F>(arguments: &mut ToolArguments, name: &str, default: F) -> HandlerResult<T>
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match arguments.remove(name) {
        None | Some(Value::Null) => Ok(default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|err| HandlerError::invalid_arguments(format!("`{name}`: {err}"))),
    }
}

/// Serializes a tool's return value.
///
/// # Errors
///
/// Returns [`HandlerError::Failed`] if the value cannot be represented as JSON.
pub fn to_output<T>(value: T) -> HandlerResult<Value>
where
    T: Serialize,
{
    serde_json::to_value(value)
        .map_err(|err| HandlerError::failed(format!("tool output is not serializable: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tool_primitives::{ExecutionContext, ParamType};

    use crate::schema::FormalParameter;

    fn add_tool() -> LocalTool {
        let signature = CallableSignature::new("add")
            .param(FormalParameter::new("a").typed("i64"))
            .param(FormalParameter::new("b").typed("i64"))
            .documented(" Adds two numbers.\n\n # Arguments\n * `a` - first\n * `b` - second");
        let handler = LocalHandler::new(|mut arguments, _ctx| async move {
            let a: i64 = take_argument(&mut arguments, "a")?;
            let b: i64 = take_argument(&mut arguments, "b")?;
            to_output(a + b)
        });
        LocalTool::from_signature(&signature, ToolOptions::default().tag("math"), handler).unwrap()
    }

    #[tokio::test]
    async fn signature_binding_registers_and_runs() {
        let registry = ToolRegistry::new();
        let tool = add_tool();
        assert_eq!(tool.descriptor().description(), "Adds two numbers.");
        assert_eq!(
            tool.descriptor().parameters().get("a").unwrap().param_type(),
            &ParamType::Integer
        );
        tool.register(&registry).unwrap();

        let registered = registry.get("add").unwrap();
        let output = registered
            .handler()
            .execute(
                json!({ "a": 2, "b": 3 }).as_object().cloned().unwrap(),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(output, json!(5));
        assert!(registry.get("add").unwrap().descriptor().tags().contains("math"));
    }

    #[test]
    fn options_override_name_and_description() {
        let signature = CallableSignature::new("helper");
        let tool = LocalTool::from_signature(
            &signature,
            ToolOptions::default()
                .named("renamed")
                .described("Explicit description")
                .permission(PermissionLevel::Elevated),
            LocalHandler::new(|_args, _ctx| async { Ok(Value::Null) }),
        )
        .unwrap();

        assert_eq!(tool.descriptor().name(), "renamed");
        assert_eq!(tool.descriptor().description(), "Explicit description");
        assert_eq!(tool.descriptor().permission_level(), PermissionLevel::Elevated);
    }

    #[test]
    fn argument_helpers_report_shape_errors() {
        let mut arguments = json!({ "n": "seven", "flag": null })
            .as_object()
            .cloned()
            .unwrap();
        let err = take_argument::<i64>(&mut arguments, "n").unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArguments { .. }));

        let missing: Option<String> = take_argument(&mut arguments, "absent").unwrap();
        assert_eq!(missing, None);

        let flag = take_argument_or(&mut arguments, "flag", || true).unwrap();
        assert!(flag);
    }
}
