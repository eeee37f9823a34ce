//! Text manipulation tools.

#![allow(clippy::needless_pass_by_value)]

use serde::Serialize;
use thiserror::Error;
use tool_registry::{LocalTool, tool};

/// Errors reported by the text tools.
#[derive(Debug, Error)]
pub enum TextError {
    /// The requested case conversion does not exist.
    #[error("unknown case type `{case_type}`; use upper, lower, title or capitalize")]
    UnknownCase {
        /// Requested conversion.
        case_type: String,
    },

    /// An empty needle matches everywhere.
    #[error("pattern argument cannot be empty")]
    EmptyPattern,
}

/// Word, character and line counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextStats {
    /// Whitespace-separated words.
    pub words: usize,
    /// Characters, optionally excluding spaces.
    pub characters: usize,
    /// Lines.
    pub lines: usize,
}

/// Bindings of this module.
///
/// # Errors
///
/// Returns an error if a derived descriptor is invalid.
pub fn tools() -> tool_primitives::Result<Vec<LocalTool>> {
    Ok(vec![
        transform_text_case_tool()?,
        analyze_text_tool()?,
        count_occurrences_tool()?,
    ])
}

/// Transforms text to a different case.
///
/// # Arguments
/// * `text` - The text to transform
/// * `case_type` - Case to apply: upper, lower, title or capitalize
///
/// # Errors
///
/// Fails for an unknown case type.
#[tool(permission = "safe", category = "general", tags = "text, transform, case")]
pub fn transform_text_case(
    text: String,
    #[tool(default = "lower")] case_type: String,
) -> Result<String, TextError> {
    match case_type.to_lowercase().as_str() {
        "upper" => Ok(text.to_uppercase()),
        "lower" => Ok(text.to_lowercase()),
        "title" => Ok(title_case(&text)),
        "capitalize" => Ok(capitalize(&text)),
        _ => Err(TextError::UnknownCase { case_type }),
    }
}

/// Counts words, characters and lines in text.
///
/// # Arguments
/// * `text` - The text to analyze
/// * `include_spaces` - Whether spaces count as characters
#[tool(permission = "safe", category = "general", tags = "text, analysis, count")]
#[must_use]
pub fn analyze_text(text: String, #[tool(default = true)] include_spaces: bool) -> TextStats {
    let characters = if include_spaces {
        text.chars().count()
    } else {
        text.chars().filter(|c| *c != ' ').count()
    };
    TextStats {
        words: text.split_whitespace().count(),
        characters,
        lines: text.lines().count(),
    }
}

/// Counts non-overlapping occurrences of a pattern in text.
///
/// # Arguments
/// * `text` - The text to search
/// * `pattern` - Literal text to look for
/// * `case_sensitive` - Whether letter case must match
///
/// # Errors
///
/// Fails when the pattern is empty.
#[tool(permission = "safe", category = "general", tags = "text, search, count")]
pub fn count_occurrences(
    text: String,
    pattern: String,
    #[tool(default = true)] case_sensitive: bool,
) -> Result<usize, TextError> {
    if pattern.is_empty() {
        return Err(TextError::EmptyPattern);
    }
    if case_sensitive {
        Ok(text.matches(pattern.as_str()).count())
    } else {
        Ok(text.to_lowercase().matches(pattern.to_lowercase().as_str()).count())
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tool_primitives::{ExecutionContext, ParamType, PermissionLevel, ToolArguments};

    fn args(value: serde_json::Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn case_conversions() {
        let convert = |case: &str| transform_text_case("hello wORLD o'neil".to_owned(), case.to_owned());
        assert_eq!(convert("upper").unwrap(), "HELLO WORLD O'NEIL");
        assert_eq!(convert("lower").unwrap(), "hello world o'neil");
        assert_eq!(convert("Title").unwrap(), "Hello World O'Neil");
        assert_eq!(convert("capitalize").unwrap(), "Hello world o'neil");
        assert!(matches!(convert("snake"), Err(TextError::UnknownCase { .. })));
    }

    #[test]
    fn analysis_counts() {
        let stats = analyze_text("Hello world!\nThis is a test.".to_owned(), true);
        assert_eq!(
            stats,
            TextStats {
                words: 6,
                characters: 28,
                lines: 2
            }
        );
        assert_eq!(analyze_text("a b c".to_owned(), false).characters, 3);
    }

    #[test]
    fn occurrences() {
        assert_eq!(count_occurrences("the cat and The hat".to_owned(), "the".to_owned(), true).unwrap(), 1);
        assert_eq!(count_occurrences("the cat and The hat".to_owned(), "the".to_owned(), false).unwrap(), 2);
        assert!(matches!(
            count_occurrences("abc".to_owned(), String::new(), true),
            Err(TextError::EmptyPattern)
        ));
    }

    #[test]
    fn derived_descriptor_reflects_signature() {
        let tool = transform_text_case_tool().unwrap();
        let descriptor = tool.descriptor();
        assert_eq!(descriptor.description(), "Transforms text to a different case.");
        assert_eq!(descriptor.permission_level(), PermissionLevel::Safe);
        assert_eq!(descriptor.parameters().required_names(), ["text"]);

        let case_type = descriptor.parameters().get("case_type").unwrap();
        assert_eq!(case_type.param_type(), &ParamType::String);
        assert_eq!(case_type.default_value(), Some(&json!("lower")));
        assert_eq!(case_type.description(), "Case to apply: upper, lower, title or capitalize");
        assert!(tool.flagged_parameters().is_empty());
    }

    #[tokio::test]
    async fn handler_applies_defaults_and_reports_errors() {
        let (_, handler) = transform_text_case_tool().unwrap().into_parts();
        let context = ExecutionContext::new();

        let lowered = handler.execute(args(json!({"text": "LOUD"})), &context).await.unwrap();
        assert_eq!(lowered, json!("loud"));

        let err = handler
            .execute(args(json!({"text": "x", "case_type": "snake"})), &context)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown case type `snake`"));

        let (_, analyze) = analyze_text_tool().unwrap().into_parts();
        let stats = analyze.execute(args(json!({"text": "one two"})), &context).await.unwrap();
        assert_eq!(stats, json!({"words": 2, "characters": 7, "lines": 1}));
    }
}
