//! Static, schema-level metadata describing a tool.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{Error, PermissionLevel, Result};

const MAX_NAME_LEN: usize = 128;

/// Arguments supplied to a tool call, keyed by parameter name.
pub type ToolArguments = Map<String, Value>;

/// Logical type of a single tool parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum ParamType {
    /// UTF-8 text.
    String,
    /// Whole number.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// Ordered collection of the element type.
    List(Box<ParamType>),
    /// Key/value mapping.
    Object,
    /// Unconstrained value.
    Any,
}

impl ParamType {
    /// Convenience constructor for `list of <element>`.
    #[must_use]
    pub fn list_of(element: ParamType) -> Self {
        Self::List(Box::new(element))
    }

    /// Returns `true` when `value` has a shape compatible with this type.
    ///
    /// Integral floats such as `5.0` are accepted for [`ParamType::Integer`];
    /// argument preparation turns them into integers before binding.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Integer => match value {
                Value::Number(number) => {
                    number.is_i64()
                        || number.is_u64()
                        || number
                            .as_f64()
                            .is_some_and(|f| f.is_finite() && f.fract() == 0.0)
                }
                _ => false,
            },
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::List(element) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|item| element.accepts(item))),
        }
    }

    /// Renders the type as a JSON-Schema fragment.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Integer => json!({ "type": "integer" }),
            Self::Number => json!({ "type": "number" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Object => json!({ "type": "object" }),
            Self::List(element) => json!({ "type": "array", "items": element.json_schema() }),
            Self::Any => json!({}),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Integer => f.write_str("integer"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::Object => f.write_str("object"),
            Self::Any => f.write_str("any"),
            Self::List(element) => write!(f, "list of {element}"),
        }
    }
}

/// Declaration of one parameter in a tool's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    name: String,
    #[serde(rename = "type")]
    param_type: ParamType,
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default)]
    description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    needs_review: bool,
}

impl ParameterSpec {
    /// Declares a required parameter without a default.
    #[must_use]
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            default: None,
            description: String::new(),
            needs_review: false,
        }
    }

    /// Declares an optional parameter that falls back to `default`.
    #[must_use]
    pub fn optional(name: impl Into<String>, param_type: ParamType, default: Value) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: Some(default),
            description: String::new(),
            needs_review: false,
        }
    }

    /// Declares an optional parameter without a default; when omitted it is
    /// simply absent from the arguments.
    #[must_use]
    pub fn omittable(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type)
        }
    }

    /// Attaches a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Marks the parameter's type as needing manual review.
    #[must_use]
    pub fn flagged_for_review(mut self) -> Self {
        self.needs_review = true;
        self
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared logical type.
    #[must_use]
    pub fn param_type(&self) -> &ParamType {
        &self.param_type
    }

    /// Whether callers must supply the parameter.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Default used when the parameter is omitted.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Description, empty when undocumented.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the type fell back to `any` during derivation.
    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.needs_review
    }
}

/// Ordered, fully enumerable parameter list for one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSchema(Vec<ParameterSpec>);

impl ParameterSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from specs in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if two specs share a name.
    pub fn from_specs<I>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = ParameterSpec>,
    {
        let mut schema = Self::new();
        for spec in specs {
            schema.push(spec)?;
        }
        Ok(schema)
    }

    /// Appends a parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if the name is empty or already declared.
    pub fn push(&mut self, spec: ParameterSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(Error::descriptor("", "parameter name cannot be empty"));
        }
        if self.get(&spec.name).is_some() {
            return Err(Error::descriptor(
                "",
                format!("parameter `{}` declared twice", spec.name),
            ));
        }
        self.0.push(spec);
        Ok(())
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.0.iter().find(|spec| spec.name == name)
    }

    /// Iterates parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.0.iter()
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the tool takes no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the required parameters, in declaration order.
    #[must_use]
    pub fn required_names(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
            .collect()
    }

    /// Renders the schema as a JSON-Schema `object` definition.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.0 {
            let mut property = spec.param_type.json_schema();
            if let Value::Object(fields) = &mut property {
                if !spec.description.is_empty() {
                    fields.insert("description".into(), Value::from(spec.description.clone()));
                }
                if let Some(default) = &spec.default {
                    fields.insert("default".into(), default.clone());
                }
            }
            properties.insert(spec.name.clone(), property);
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_names(),
        })
    }
}

impl<'a> IntoIterator for &'a ParameterSchema {
    type Item = &'a ParameterSpec;
    type IntoIter = std::slice::Iter<'a, ParameterSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Grouping used to organise the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Reads or writes local files.
    FileSystem,
    /// Looks things up.
    Information,
    /// Task and note keeping.
    Productivity,
    /// Messaging and notifications.
    Communication,
    /// Developer tooling.
    Development,
    /// Operating-system level actions.
    System,
    /// Anything else.
    #[default]
    General,
}

impl ToolCategory {
    /// Returns the canonical snake-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileSystem => "file_system",
            Self::Information => "information",
            Self::Productivity => "productivity",
            Self::Communication => "communication",
            Self::Development => "development",
            Self::System => "system",
            Self::General => "general",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ToolCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file_system" => Ok(Self::FileSystem),
            "information" => Ok(Self::Information),
            "productivity" => Ok(Self::Productivity),
            "communication" => Ok(Self::Communication),
            "development" => Ok(Self::Development),
            "system" => Ok(Self::System),
            "general" => Ok(Self::General),
            other => Err(Error::unknown("tool category", other)),
        }
    }
}

/// Where a tool's handler lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// In-process function.
    #[default]
    Local,
    /// User-supplied extension executable.
    Extension,
    /// Proxied through a remote tool server.
    Remote,
}

impl SourceType {
    /// Returns the canonical lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Extension => "extension",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Worked example shown alongside a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExample {
    /// What the example demonstrates.
    pub description: String,
    /// Arguments passed to the tool.
    #[serde(default)]
    pub arguments: ToolArguments,
    /// Description of the expected result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<String>,
}

impl ToolExample {
    /// Creates an example from a description and arguments.
    #[must_use]
    pub fn new(description: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            description: description.into(),
            arguments,
            expected_result: None,
        }
    }

    /// Describes the expected result.
    #[must_use]
    pub fn expecting(mut self, result: impl Into<String>) -> Self {
        self.expected_result = Some(result.into());
        self
    }
}

/// Backend-neutral `{name, description, parameters}` export of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON-Schema object describing the parameters.
    pub parameters: Value,
}

/// Immutable metadata for a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    #[serde(default)]
    parameters: ParameterSchema,
    #[serde(default)]
    permission_level: PermissionLevel,
    #[serde(default)]
    category: ToolCategory,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    tags: BTreeSet<String>,
    #[serde(default)]
    source_type: SourceType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    source_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    examples: Vec<ToolExample>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ToolDescriptor {
    /// Starts building a descriptor for the named tool.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ToolDescriptorBuilder {
        ToolDescriptorBuilder {
            name: name.into(),
            description: None,
            parameters: ParameterSchema::new(),
            permission_level: PermissionLevel::default(),
            category: ToolCategory::default(),
            tags: BTreeSet::new(),
            source_type: SourceType::default(),
            source_id: String::new(),
            examples: Vec::new(),
            enabled: true,
        }
    }

    /// Unique tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Parameter schema.
    #[must_use]
    pub fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }

    /// Risk level used by the permission gate.
    #[must_use]
    pub fn permission_level(&self) -> PermissionLevel {
        self.permission_level
    }

    /// Catalog category.
    #[must_use]
    pub fn category(&self) -> ToolCategory {
        self.category
    }

    /// Search tags.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Kind of source that provided the tool.
    #[must_use]
    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    /// Source identifier such as a remote server name; empty for local tools.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Usage examples.
    #[must_use]
    pub fn examples(&self) -> &[ToolExample] {
        &self.examples
    }

    /// Disabled tools are never advertised or executed.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Exports the descriptor as `{name, description, parameters}`.
    #[must_use]
    pub fn export(&self) -> FunctionSpec {
        FunctionSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.to_json_schema(),
        }
    }
}

/// Builder for [`ToolDescriptor`].
#[derive(Debug)]
pub struct ToolDescriptorBuilder {
    name: String,
    description: Option<String>,
    parameters: ParameterSchema,
    permission_level: PermissionLevel,
    category: ToolCategory,
    tags: BTreeSet<String>,
    source_type: SourceType,
    source_id: String,
    examples: Vec<ToolExample>,
    enabled: bool,
}

impl ToolDescriptorBuilder {
    /// Sets the description. Blank descriptions fall back to the tool name.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the parameter schema.
    #[must_use]
    pub fn parameters(mut self, parameters: ParameterSchema) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the permission level.
    #[must_use]
    pub fn permission(mut self, level: PermissionLevel) -> Self {
        self.permission_level = level;
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    /// Adds a tag, ignoring blank strings.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let tag = tag.trim();
        if !tag.is_empty() {
            self.tags.insert(tag.to_owned());
        }
        self
    }

    /// Adds several tags.
    #[must_use]
    pub fn tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        tags.into_iter().fold(self, Self::tag)
    }

    /// Records which source provided the tool.
    #[must_use]
    pub fn source(mut self, source_type: SourceType, source_id: impl Into<String>) -> Self {
        self.source_type = source_type;
        self.source_id = source_id.into();
        self
    }

    /// Appends a usage example.
    #[must_use]
    pub fn example(mut self, example: ToolExample) -> Self {
        self.examples.push(example);
        self
    }

    /// Enables or disables the tool.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validates and produces the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] when the name is empty, too long or
    /// contains whitespace, or when the source identifier does not match the
    /// source type (local tools carry none, other sources require one).
    pub fn build(self) -> Result<ToolDescriptor> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(Error::descriptor("", "tool name cannot be empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::descriptor(
                name,
                format!("tool name length must be <= {MAX_NAME_LEN}"),
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(Error::descriptor(name, "tool name cannot contain whitespace"));
        }

        let source_id = self.source_id.trim().to_owned();
        match self.source_type {
            SourceType::Local if !source_id.is_empty() => {
                return Err(Error::descriptor(
                    name,
                    "local tools carry no source identifier",
                ));
            }
            SourceType::Extension | SourceType::Remote if source_id.is_empty() => {
                return Err(Error::descriptor(
                    name,
                    format!("{} tools require a source identifier", self.source_type),
                ));
            }
            _ => {}
        }

        let description = self
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| name.clone());

        Ok(ToolDescriptor {
            name,
            description,
            parameters: self.parameters,
            permission_level: self.permission_level,
            category: self.category,
            tags: self.tags,
            source_type: self.source_type,
            source_id,
            examples: self.examples,
            enabled: self.enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_schema() -> ParameterSchema {
        ParameterSchema::from_specs([
            ParameterSpec::required("a", ParamType::Integer).with_description("count"),
            ParameterSpec::optional("b", ParamType::String, json!("x")).with_description("label"),
        ])
        .unwrap()
    }

    #[test]
    fn builds_descriptor_with_defaults() {
        let descriptor = ToolDescriptor::builder("add")
            .parameters(add_schema())
            .tags(["math", " ", "math"])
            .build()
            .unwrap();

        assert_eq!(descriptor.name(), "add");
        assert_eq!(descriptor.description(), "add");
        assert_eq!(descriptor.permission_level(), PermissionLevel::Safe);
        assert_eq!(descriptor.category(), ToolCategory::General);
        assert_eq!(descriptor.source_type(), SourceType::Local);
        assert_eq!(descriptor.source_id(), "");
        assert_eq!(descriptor.tags().len(), 1);
        assert!(descriptor.is_enabled());
    }

    #[test]
    fn rejects_invalid_names_and_sources() {
        assert!(ToolDescriptor::builder("  ").build().is_err());
        assert!(ToolDescriptor::builder("two words").build().is_err());
        assert!(
            ToolDescriptor::builder("remote_tool")
                .source(SourceType::Remote, "")
                .build()
                .is_err()
        );
        assert!(
            ToolDescriptor::builder("local_tool")
                .source(SourceType::Local, "somewhere")
                .build()
                .is_err()
        );
    }

    #[test]
    fn schema_rejects_duplicate_parameters() {
        let err = ParameterSchema::from_specs([
            ParameterSpec::required("a", ParamType::Integer),
            ParameterSpec::required("a", ParamType::String),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn export_renders_json_schema() {
        let descriptor = ToolDescriptor::builder("add")
            .description("Add numbers")
            .parameters(add_schema())
            .build()
            .unwrap();

        let spec = descriptor.export();
        assert_eq!(spec.name, "add");
        assert_eq!(spec.parameters["type"], "object");
        assert_eq!(spec.parameters["required"], json!(["a"]));
        assert_eq!(spec.parameters["properties"]["a"]["type"], "integer");
        assert_eq!(spec.parameters["properties"]["b"]["default"], "x");
        assert_eq!(spec.parameters["properties"]["b"]["description"], "label");
    }

    #[test]
    fn list_types_accept_matching_elements_only() {
        let ty = ParamType::list_of(ParamType::Integer);
        assert!(ty.accepts(&json!([1, 2, 3.0])));
        assert!(!ty.accepts(&json!([1, "two"])));
        assert!(!ty.accepts(&json!(1)));
        assert_eq!(ty.to_string(), "list of integer");
        assert_eq!(ty.json_schema(), json!({"type": "array", "items": {"type": "integer"}}));
    }

    #[test]
    fn integer_rejects_fractional_numbers() {
        assert!(ParamType::Integer.accepts(&json!(4)));
        assert!(!ParamType::Integer.accepts(&json!(4.5)));
        assert!(!ParamType::Integer.accepts(&json!("4")));
        assert!(ParamType::Number.accepts(&json!(4.5)));
    }

    #[test]
    fn param_type_serde_shape() {
        let json = serde_json::to_value(ParamType::list_of(ParamType::String)).unwrap();
        assert_eq!(json, json!({"type": "list", "items": {"type": "string"}}));
        let parsed: ParamType = serde_json::from_value(json!({"type": "any"})).unwrap();
        assert_eq!(parsed, ParamType::Any);
    }
}
