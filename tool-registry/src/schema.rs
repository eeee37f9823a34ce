//! Schema derivation from callable signatures and documentation.
//!
//! Derivation never fails: types that cannot be mapped degrade to `any` and
//! are flagged for review, and a callable without documentation still gets a
//! description (its own name).
//!
//! Declared types are matched on their rendered spelling, so both Rust types
//! (`Vec<i64>`, `Option<String>`, `serde_json::Value`) and language-neutral
//! names (`int`, `list[str]`, `dict`) are understood.

use std::collections::HashMap;

use serde_json::Value;
use tool_primitives::{ParamType, ParameterSchema, ParameterSpec};
use tracing::warn;

/// One formal parameter of a callable.
#[derive(Debug, Clone, PartialEq)]
pub struct FormalParameter {
    /// Parameter name.
    pub name: String,
    /// Declared type as written in source, if known.
    pub declared_type: Option<String>,
    /// Default value, making the parameter optional.
    pub default: Option<Value>,
}

impl FormalParameter {
    /// Creates an untyped parameter without a default.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: None,
            default: None,
        }
    }

    /// Sets the declared type.
    #[must_use]
    pub fn typed(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Reflected view of a callable: its name, parameters and documentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallableSignature {
    /// Declared name of the callable.
    pub name: String,
    /// Formal parameters in declaration order.
    pub parameters: Vec<FormalParameter>,
    /// Free-text documentation attached to the callable.
    pub documentation: Option<String>,
}

impl CallableSignature {
    /// Creates a signature with no parameters or documentation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, parameter: FormalParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Attaches documentation.
    #[must_use]
    pub fn documented(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    /// Derives the parameter schema and summary for this callable.
    #[must_use]
    pub fn derive(&self) -> DerivedSchema {
        derive(self)
    }
}

/// Output of the deriver.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSchema {
    /// One-paragraph description; the callable name when undocumented.
    pub summary: String,
    /// Ordered parameter schema.
    pub parameters: ParameterSchema,
    /// Parameters whose type fell back to `any`.
    pub flagged: Vec<String>,
}

/// Derives a [`DerivedSchema`] from a callable signature.
#[must_use]
pub fn derive(signature: &CallableSignature) -> DerivedSchema {
    let known: Vec<&str> = signature
        .parameters
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    let docs = signature
        .documentation
        .as_deref()
        .map(|doc| parse_documentation(doc, &known))
        .unwrap_or_default();

    let mut parameters = ParameterSchema::new();
    let mut flagged = Vec::new();

    for formal in &signature.parameters {
        let mapped = formal
            .declared_type
            .as_deref()
            .map(map_declared_type)
            .unwrap_or(Mapped::UNKNOWN);

        if !mapped.recognized {
            warn!(
                tool = %signature.name,
                parameter = %formal.name,
                declared_type = formal.declared_type.as_deref().unwrap_or("<none>"),
                "parameter type not recognised; falling back to any"
            );
            flagged.push(formal.name.clone());
        }

        let mut spec = match (&formal.default, mapped.optional) {
            (Some(default), _) => ParameterSpec::optional(&formal.name, mapped.ty, default.clone()),
            (None, true) => ParameterSpec::optional(&formal.name, mapped.ty, Value::Null),
            (None, false) => ParameterSpec::required(&formal.name, mapped.ty),
        };
        if let Some(description) = docs.parameters.get(&formal.name) {
            spec = spec.with_description(description.clone());
        }
        if !mapped.recognized {
            spec = spec.flagged_for_review();
        }

        if let Err(err) = parameters.push(spec) {
            warn!(tool = %signature.name, error = %err, "skipping parameter");
        }
    }

    let summary = if docs.summary.is_empty() {
        signature.name.clone()
    } else {
        docs.summary
    };

    DerivedSchema {
        summary,
        parameters,
        flagged,
    }
}

/// Normalises a JSON-Schema `object` definition, as advertised by remote
/// tool servers, into a parameter schema.
///
/// Properties are taken in the order the JSON object yields them. A property
/// listed in `required` without a `default` is required; everything else is
/// optional.
#[must_use]
pub fn from_json_schema(schema: &Value) -> DerivedSchema {
    let summary = schema
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut parameters = ParameterSchema::new();
    let mut flagged = Vec::new();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return DerivedSchema {
            summary,
            parameters,
            flagged,
        };
    };

    for (name, property) in properties {
        let (ty, recognized) = json_schema_type(property);
        let default = property.get("default").cloned();
        let mut spec = match default {
            Some(default) => ParameterSpec::optional(name, ty, default),
            None if required.contains(&name.as_str()) => ParameterSpec::required(name, ty),
            None => ParameterSpec::omittable(name, ty),
        };
        if let Some(description) = property.get("description").and_then(Value::as_str) {
            spec = spec.with_description(description);
        }
        if !recognized {
            flagged.push(name.clone());
            spec = spec.flagged_for_review();
        }
        if let Err(err) = parameters.push(spec) {
            warn!(error = %err, "skipping remote parameter");
        }
    }

    DerivedSchema {
        summary,
        parameters,
        flagged,
    }
}

fn json_schema_type(property: &Value) -> (ParamType, bool) {
    let declared = match property.get("type") {
        None => return (ParamType::Any, true),
        Some(Value::String(ty)) => ty.as_str(),
        // `["string", "null"]` style unions: take the first non-null member.
        Some(Value::Array(types)) => match types
            .iter()
            .filter_map(Value::as_str)
            .find(|ty| *ty != "null")
        {
            Some(ty) => ty,
            None => return (ParamType::Any, false),
        },
        Some(_) => return (ParamType::Any, false),
    };

    match declared {
        "string" => (ParamType::String, true),
        "integer" => (ParamType::Integer, true),
        "number" => (ParamType::Number, true),
        "boolean" => (ParamType::Boolean, true),
        "object" => (ParamType::Object, true),
        "array" => {
            let (items, recognized) = property
                .get("items")
                .map_or((ParamType::Any, true), json_schema_type);
            (ParamType::list_of(items), recognized)
        }
        _ => (ParamType::Any, false),
    }
}

#[derive(Debug, Clone)]
struct Mapped {
    ty: ParamType,
    optional: bool,
    recognized: bool,
}

impl Mapped {
    const UNKNOWN: Self = Self {
        ty: ParamType::Any,
        optional: false,
        recognized: false,
    };

    const fn known(ty: ParamType) -> Self {
        Self {
            ty,
            optional: false,
            recognized: true,
        }
    }
}

fn map_declared_type(declared: &str) -> Mapped {
    let compact: String = declared
        .split_whitespace()
        .filter(|token| !token.starts_with('\'') && *token != "mut" && *token != "dyn")
        .collect();
    map_compact(compact.trim_start_matches('&'))
}

fn map_compact(ty: &str) -> Mapped {
    let ty = ty.trim_start_matches('&');

    // Slices and arrays: `[T]`, `[T;N]`.
    if let Some(inner) = ty.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let element = inner.split(';').next().unwrap_or_default();
        return list_of(Some(element));
    }

    let (head, args) = split_generics(ty);
    let last = head.rsplit("::").next().unwrap_or(head).to_ascii_lowercase();
    let first_arg = args.first().copied();

    match last.as_str() {
        "string" | "str" | "char" | "pathbuf" | "path" | "osstring" | "text" => {
            Mapped::known(ParamType::String)
        }
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" | "int" | "integer" => Mapped::known(ParamType::Integer),
        "f32" | "f64" | "float" | "double" | "number" => Mapped::known(ParamType::Number),
        "bool" | "boolean" => Mapped::known(ParamType::Boolean),
        "vec" | "vecdeque" | "list" | "array" | "sequence" | "hashset" | "btreeset" | "set" => {
            list_of(first_arg)
        }
        "hashmap" | "btreemap" | "map" | "dict" | "mapping" | "object" => {
            Mapped::known(ParamType::Object)
        }
        "value" | "any" => Mapped::known(ParamType::Any),
        "option" | "optional" => {
            let inner = first_arg.map_or(Mapped::UNKNOWN, map_compact);
            Mapped {
                optional: true,
                ..inner
            }
        }
        "box" | "arc" | "rc" => first_arg.map_or(Mapped::UNKNOWN, map_compact),
        _ => Mapped::UNKNOWN,
    }
}

fn list_of(element: Option<&str>) -> Mapped {
    match element {
        None => Mapped::known(ParamType::list_of(ParamType::Any)),
        Some(element) => {
            let inner = map_compact(element);
            Mapped {
                ty: ParamType::list_of(inner.ty),
                optional: false,
                recognized: inner.recognized,
            }
        }
    }
}

/// Splits `Head<A, B>` (or `head[A, B]`) into the head and its top-level
/// arguments.
fn split_generics(ty: &str) -> (&str, Vec<&str>) {
    let open = ty.find(['<', '[']);
    let Some(open) = open else {
        return (ty, Vec::new());
    };
    let close = if ty.as_bytes()[open] == b'<' { '>' } else { ']' };
    let Some(body) = ty[open + 1..].strip_suffix(close) else {
        return (ty, Vec::new());
    };

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, ch) in body.char_indices() {
        match ch {
            '<' | '[' | '(' => depth += 1,
            '>' | ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(&body[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    if start < body.len() {
        args.push(&body[start..]);
    }
    (&ty[..open], args)
}

#[derive(Debug, Default)]
struct ParsedDocs {
    summary: String,
    parameters: HashMap<String, String>,
}

const SECTION_HEADERS: [&str; 4] = ["args", "arguments", "parameters", "params"];

fn is_section_header(line: &str) -> bool {
    let normalized = line
        .trim()
        .trim_start_matches('#')
        .trim()
        .trim_end_matches(':')
        .to_ascii_lowercase();
    SECTION_HEADERS.contains(&normalized.as_str())
}

fn parse_documentation(doc: &str, known: &[&str]) -> ParsedDocs {
    let mut parsed = ParsedDocs::default();
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut summary_done = false;
    let mut in_section = false;
    let mut last_param: Option<String> = None;

    for raw in doc.lines() {
        let unprefixed = raw.strip_prefix(' ').unwrap_or(raw);
        let line = raw.trim();

        if line.is_empty() {
            summary_done |= !summary_lines.is_empty();
            last_param = None;
            continue;
        }
        if is_section_header(line) {
            in_section = true;
            summary_done |= !summary_lines.is_empty();
            last_param = None;
            continue;
        }
        if line.starts_with('#') {
            in_section = false;
            summary_done |= !summary_lines.is_empty();
            last_param = None;
            continue;
        }

        let entries = parse_parameter_entries(line, known);
        if !entries.is_empty() {
            summary_done |= !summary_lines.is_empty();
            last_param = entries.last().map(|(name, _)| name.clone());
            for (name, meaning) in entries {
                parsed.parameters.entry(name).or_insert(meaning);
            }
            continue;
        }

        if in_section && unprefixed.starts_with(char::is_whitespace) {
            if let Some(description) = last_param
                .as_ref()
                .and_then(|name| parsed.parameters.get_mut(name))
            {
                if !description.is_empty() {
                    description.push(' ');
                }
                description.push_str(line);
                continue;
            }
        }

        if !summary_done && !in_section {
            summary_lines.push(line);
        }
    }

    parsed.summary = summary_lines.join(" ");
    parsed
}

/// Parses `name: meaning`, `` * `name` - meaning `` and similar forms. A line
/// such as `a: count, b: label` yields one entry per known name.
fn parse_parameter_entries(line: &str, known: &[&str]) -> Vec<(String, String)> {
    let Some((name, meaning)) = parse_parameter_line(line, known) else {
        return Vec::new();
    };

    for (index, _) in meaning.match_indices(',') {
        let rest = &meaning[index + 1..];
        let mut tail = parse_parameter_entries(rest.trim_start(), known);
        if !tail.is_empty() {
            let mut entries = vec![(name, meaning[..index].trim().to_owned())];
            entries.append(&mut tail);
            return entries;
        }
    }

    vec![(name, meaning.trim().to_owned())]
}

fn parse_parameter_line(line: &str, known: &[&str]) -> Option<(String, String)> {
    let line = line
        .strip_prefix("* ")
        .or_else(|| line.strip_prefix("- "))
        .or_else(|| line.strip_prefix("+ "))
        .unwrap_or(line)
        .trim_start();

    let (name, rest) = if let Some(quoted) = line.strip_prefix('`') {
        let end = quoted.find('`')?;
        (&quoted[..end], &quoted[end + 1..])
    } else {
        let end = line
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(line.len());
        (&line[..end], &line[end..])
    };
    if !known.contains(&name) {
        return None;
    }

    let mut rest = rest.trim_start();
    // Optional `(type)` annotation.
    if let Some(annotated) = rest.strip_prefix('(') {
        rest = annotated.split_once(')')?.1.trim_start();
    }
    let meaning = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('-'))
        .or_else(|| rest.strip_prefix('\u{2013}'))?;

    Some((name.to_owned(), meaning.to_owned()))
}
