//! Argument checking against a tool's parameter schema.

use serde_json::Value;
use thiserror::Error;
use tool_primitives::{ParamType, ParameterSchema, ToolArguments};

/// One way a call's arguments fail to match the schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Violation {
    /// A required parameter was not supplied.
    #[error("missing required parameter `{name}`")]
    Missing {
        /// Parameter name.
        name: String,
    },

    /// The schema has no parameter with this name.
    #[error("unexpected parameter `{name}`")]
    Unexpected {
        /// Supplied name.
        name: String,
    },

    /// The value does not have the declared shape.
    #[error("parameter `{name}` expects {expected}, got {found}")]
    TypeMismatch {
        /// Parameter name.
        name: String,
        /// Declared type, rendered.
        expected: String,
        /// JSON kind of the supplied value.
        found: &'static str,
    },
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Lists every violation in `arguments`; empty means valid.
///
/// `null` on an optional parameter counts as not supplied.
#[must_use]
pub fn check(schema: &ParameterSchema, arguments: &ToolArguments) -> Vec<Violation> {
    let mut violations = Vec::new();

    for spec in schema {
        match arguments.get(spec.name()) {
            None => {
                if spec.is_required() {
                    violations.push(Violation::Missing {
                        name: spec.name().to_owned(),
                    });
                }
            }
            Some(Value::Null) if !spec.is_required() => {}
            Some(value) => {
                if !spec.param_type().accepts(value) {
                    violations.push(Violation::TypeMismatch {
                        name: spec.name().to_owned(),
                        expected: spec.param_type().to_string(),
                        found: json_kind(value),
                    });
                }
            }
        }
    }

    violations.extend(
        arguments
            .keys()
            .filter(|key| schema.get(key).is_none())
            .map(|key| Violation::Unexpected { name: key.clone() }),
    );
    violations
}

/// `5.0` for an integer parameter, as the exact integer it denotes.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn whole_number(value: &Value) -> Option<i64> {
    let Value::Number(number) = value else {
        return None;
    };
    let float = number.as_f64().filter(|_| number.is_f64())?;
    let in_range = float >= i64::MIN as f64 && float < i64::MAX as f64;
    (in_range && float.fract() == 0.0).then_some(float as i64)
}

fn normalize_integers(param_type: &ParamType, value: &mut Value) {
    match param_type {
        ParamType::Integer => {
            if let Some(whole) = whole_number(value) {
                *value = Value::from(whole);
            }
        }
        ParamType::List(element) => {
            if let Value::Array(items) = value {
                for item in items {
                    normalize_integers(element, item);
                }
            }
        }
        _ => {}
    }
}

/// Validates `arguments`, rewrites integral floats given for integer
/// parameters as integers and fills declared defaults for omitted parameters.
///
/// # Errors
///
/// Returns every [`Violation`] found; the handler must not run in that case.
pub fn prepare(
    schema: &ParameterSchema,
    mut arguments: ToolArguments,
) -> Result<ToolArguments, Vec<Violation>> {
    let violations = check(schema, &arguments);
    if !violations.is_empty() {
        return Err(violations);
    }

    for spec in schema {
        let supplied = arguments
            .get(spec.name())
            .is_some_and(|value| !value.is_null());
        if supplied {
            if let Some(value) = arguments.get_mut(spec.name()) {
                normalize_integers(spec.param_type(), value);
            }
            continue;
        }
        match spec.default_value() {
            Some(default) => {
                arguments.insert(spec.name().to_owned(), default.clone());
            }
            None => {
                arguments.remove(spec.name());
            }
        }
    }
    Ok(arguments)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tool_primitives::{ParamType, ParameterSpec};

    fn schema() -> ParameterSchema {
        ParameterSchema::from_specs([
            ParameterSpec::required("a", ParamType::Integer),
            ParameterSpec::optional("b", ParamType::String, json!("x")),
            ParameterSpec::omittable("tags", ParamType::list_of(ParamType::String)),
        ])
        .unwrap()
    }

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn fills_defaults_and_drops_null_optionals() {
        let prepared = prepare(&schema(), args(json!({"a": 2, "tags": null}))).unwrap();
        assert_eq!(Value::Object(prepared), json!({"a": 2, "b": "x"}));

        let explicit = prepare(&schema(), args(json!({"a": 2, "b": "y"}))).unwrap();
        assert_eq!(explicit["b"], "y");
    }

    #[test]
    fn reports_every_violation() {
        let violations = check(
            &schema(),
            &args(json!({"b": 3, "tags": ["ok", 1], "extra": true})),
        );
        assert_eq!(
            violations,
            vec![
                Violation::Missing { name: "a".into() },
                Violation::TypeMismatch {
                    name: "b".into(),
                    expected: "string".into(),
                    found: "integer",
                },
                Violation::TypeMismatch {
                    name: "tags".into(),
                    expected: "list of string".into(),
                    found: "list",
                },
                Violation::Unexpected {
                    name: "extra".into()
                },
            ]
        );
    }

    #[test]
    fn integral_floats_reach_the_handler_as_integers() {
        let schema = ParameterSchema::from_specs([
            ParameterSpec::required("a", ParamType::Integer),
            ParameterSpec::omittable("ids", ParamType::list_of(ParamType::Integer)),
            ParameterSpec::omittable("ratio", ParamType::Number),
        ])
        .unwrap();
        let prepared = prepare(
            &schema,
            args(json!({"a": 2.0, "ids": [1, 3.0, -4.0], "ratio": 1.0})),
        )
        .unwrap();

        assert_eq!(prepared["a"], json!(2));
        assert!(prepared["a"].is_i64());
        assert_eq!(prepared["ids"], json!([1, 3, -4]));
        assert!(prepared["ratio"].is_f64());
        assert_eq!(serde_json::from_value::<i64>(prepared["a"].clone()).unwrap(), 2);
        assert!(prepare(&schema, args(json!({"a": 2.5}))).is_err());
    }

    #[test]
    fn null_is_not_a_value_for_required_parameters() {
        let violations = check(&schema(), &args(json!({"a": null})));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].to_string().contains("expects integer, got null"));
    }
}
