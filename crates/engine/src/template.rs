//! Template resolution over the execution context.
//!
//! Templates use the `{{ ... }}` syntax and expose four namespaces:
//!
//! - `input.*`: workflow inputs after default merging
//! - `results.*`: stored outputs of prior steps
//! - `context.*`: alias of `results`
//! - `vars.*`: user variables (reserved)
//!
//! Dot paths navigate nested structures; numeric segments index arrays
//! (`{{ results.scan.items.0.id }}`). A missing key is a fatal rendering
//! error, never a silent empty string.
//!
//! A string that is exactly one expression resolves to the referenced JSON
//! value directly, so numbers stay numbers and strings stay strings. Mixed
//! text renders each expression into the surrounding string; the rendered
//! whole is then re-parsed as JSON when possible, which turns a rendered
//! `42` into a number and a rendered `[1, 2]` into an array.

use serde_json::Value as JsonValue;

use crate::context::ExecutionContext;
use crate::error::TemplateError;

/// Recursively resolve all template expressions in a JSON value.
///
/// Strings without a `{{` marker pass through unchanged, as do all
/// non-string scalars. Arrays and objects are rebuilt with every nested
/// value resolved; object key order is preserved.
pub fn resolve_value(value: &JsonValue, context: &mut ExecutionContext) -> Result<JsonValue, TemplateError> {
    match value {
        JsonValue::String(text) if contains_template(text) => render_string(text, context),
        JsonValue::Array(items) => {
            let mut resolved_items = Vec::with_capacity(items.len());
            for item in items {
                resolved_items.push(resolve_value(item, context)?);
            }
            Ok(JsonValue::Array(resolved_items))
        }
        JsonValue::Object(map) => {
            let mut resolved_map = serde_json::Map::with_capacity(map.len());
            for (key, nested) in map {
                resolved_map.insert(key.clone(), resolve_value(nested, context)?);
            }
            Ok(JsonValue::Object(resolved_map))
        }
        other => Ok(other.clone()),
    }
}

/// Returns true when the string carries a template marker.
pub fn contains_template(text: &str) -> bool {
    text.contains("{{")
}

/// Render a string containing at least one template marker.
fn render_string(input: &str, context: &mut ExecutionContext) -> Result<JsonValue, TemplateError> {
    let trimmed = input.trim();
    if let Some(inner) = single_expression(trimmed) {
        return resolve_expression(inner, context);
    }

    let mut output = String::new();
    let mut remainder = input;
    while let Some(start) = remainder.find("{{") {
        let (before, after) = remainder.split_at(start);
        output.push_str(before);

        let after_marker = &after[2..];
        let Some(end) = after_marker.find("}}") else {
            return Err(TemplateError::Unterminated { input: input.to_string() });
        };
        let expression = after_marker[..end].trim();
        let resolved = resolve_expression(expression, context)?;
        output.push_str(&format_json_value(&resolved));
        remainder = &after_marker[end + 2..];
    }
    output.push_str(remainder);

    Ok(parse_rendered(output))
}

/// Returns the inner expression when the whole string is one `{{ ... }}`.
fn single_expression(trimmed: &str) -> Option<&str> {
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Structured-parse pass over a rendered string.
fn parse_rendered(rendered: String) -> JsonValue {
    match serde_json::from_str::<JsonValue>(&rendered) {
        Ok(parsed) => parsed,
        Err(_) => JsonValue::String(rendered),
    }
}

/// Resolve one expression (no delimiters) against the context.
///
/// Records `input.<name>` heads into the context's template-variable set.
/// A leading dot is tolerated so Go-style `.input.cluster` paths resolve
/// the same as `input.cluster`.
fn resolve_expression(expression: &str, context: &mut ExecutionContext) -> Result<JsonValue, TemplateError> {
    let normalized = expression.trim_start_matches('.');
    let mut segments = normalized.split('.');
    let namespace = segments.next().unwrap_or_default();
    let path: Vec<&str> = segments.collect();

    let missing = |missing: String| TemplateError::MissingKey {
        expression: expression.to_string(),
        missing,
    };

    match namespace {
        "input" => {
            let Some(head) = path.first().copied() else {
                return Err(missing("input".to_string()));
            };
            context.template_vars.insert(head.to_string());
            let value = context.input.get(head).ok_or_else(|| missing(format!("input.{head}")))?;
            navigate_path(value, &path[1..], expression)
        }
        "results" | "context" => {
            let Some(head) = path.first().copied() else {
                return Err(missing(namespace.to_string()));
            };
            let value = context
                .results
                .get(head)
                .ok_or_else(|| missing(format!("{namespace}.{head}")))?;
            navigate_path(value, &path[1..], expression)
        }
        "vars" => {
            let Some(head) = path.first().copied() else {
                return Err(missing("vars".to_string()));
            };
            let value = context.vars.get(head).ok_or_else(|| missing(format!("vars.{head}")))?;
            navigate_path(value, &path[1..], expression)
        }
        other => Err(TemplateError::UnknownNamespace {
            expression: expression.to_string(),
            namespace: other.to_string(),
        }),
    }
}

/// Walk a dot path through a JSON value; every segment must resolve.
fn navigate_path(root: &JsonValue, path: &[&str], expression: &str) -> Result<JsonValue, TemplateError> {
    let mut current = root;
    for segment in path {
        let next = match current {
            JsonValue::Object(map) => map.get(*segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
            _ => None,
        };
        current = next.ok_or_else(|| TemplateError::MissingKey {
            expression: expression.to_string(),
            missing: (*segment).to_string(),
        })?;
    }
    Ok(current.clone())
}

/// Select a nested JSON value by a minimal dot path with optional numeric
/// index segments. Returns `None` when any segment is missing or applied to
/// the wrong JSON type. Used by condition `json_path` expectations.
pub fn select_path(value: &JsonValue, path: &str) -> Option<JsonValue> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Some(value.clone());
    }

    let mut current = value;
    for segment in trimmed.split('.') {
        if segment.is_empty() {
            continue;
        }
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Stringify a JSON value for embedding inside rendered text.
fn format_json_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        JsonValue::Number(number) => number.to_string(),
        JsonValue::Bool(flag) => flag.to_string(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
