//! Structured output handling for agent answers.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{BlockError, ErrorKind};

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

/// The answer parsed against the output schema.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutput {
    /// Parsed answer, `None` when the text held no JSON.
    pub data: Option<Value>,
    /// Schema problems left after coercion.
    pub warnings: Vec<String>,
}

/// Pull the JSON part out of a model answer: a fenced block, or the first
/// balanced object or array.
pub fn extract_json(content: &str) -> &str {
    let content = content.trim();
    if let Some(inner) = FENCED_JSON.captures(content).and_then(|c| c.get(1)) {
        return inner.as_str().trim();
    }

    let Some(start) = content.find(['{', '[']) else {
        return content;
    };
    let bytes = content.as_bytes();
    let (open, close) = if bytes[start] == b'[' { (b'[', b']') } else { (b'{', b'}') };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match *b {
            b'"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return &content[start..=i];
                }
            }
            _ => {}
        }
    }
    &content[start..]
}

/// Parse and check `content` against `schema`.
///
/// In strict mode any mismatch fails with `schema_violation`. Otherwise the
/// value is coerced toward the schema and leftover problems become warnings.
pub fn structure_output(
    content: &str,
    schema: &Value,
    strict: bool,
) -> Result<StructuredOutput, BlockError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| BlockError::validation(format!("invalid output schema: {e}")))?;

    let mut data = match serde_json::from_str::<Value>(extract_json(content)) {
        Ok(data) => data,
        Err(e) if strict => {
            return Err(BlockError::new(ErrorKind::SchemaViolation, format!("failed to parse output as JSON: {e}")));
        }
        Err(e) => {
            return Ok(StructuredOutput {
                data: None,
                warnings: vec![format!("failed to parse output as JSON: {e}")],
            });
        }
    };

    let errors: Vec<String> = validator.iter_errors(&data).map(|e| describe(&e)).collect();
    if errors.is_empty() {
        return Ok(StructuredOutput {
            data: Some(data),
            warnings: Vec::new(),
        });
    }
    if strict {
        return Err(BlockError::new(ErrorKind::SchemaViolation, format!("output does not match schema: {}", errors.join("; "))));
    }

    coerce(&mut data, schema);
    let warnings = validator.iter_errors(&data).map(|e| describe(&e)).collect();
    Ok(StructuredOutput {
        data: Some(data),
        warnings,
    })
}

fn describe(error: &jsonschema::ValidationError<'_>) -> String {
    error.to_string()
}

fn expected_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

/// Best-effort conversion of `value` toward `schema`.
fn coerce(
    value: &mut Value,
    schema: &Value,
) {
    let Some(expected) = expected_type(schema) else {
        return;
    };
    let replacement = match (expected, &mut *value) {
        ("object", Value::Object(fields)) => {
            if let Some(Value::Object(props)) = schema.get("properties") {
                for (name, prop) in props {
                    if let Some(field) = fields.get_mut(name) {
                        coerce(field, prop);
                    }
                }
            }
            None
        }
        ("array", Value::Array(items)) => {
            if let Some(item_schema) = schema.get("items") {
                items.iter_mut().for_each(|item| coerce(item, item_schema));
            }
            None
        }
        ("array", Value::Null) => None,
        ("array", other) => {
            let mut item = other.take();
            if let Some(item_schema) = schema.get("items") {
                coerce(&mut item, item_schema);
            }
            Some(Value::Array(vec![item]))
        }
        ("number" | "integer", Value::String(s)) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(n) => Some(Value::from(n)),
                Err(_) => s.parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number),
            }
        }
        ("boolean", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        _ => None,
    };
    if let Some(replacement) = replacement {
        *value = replacement;
    }
}

/// Fields of a structured answer spread into the block outputs.
pub fn spread_fields(data: &Value) -> Map<String, Value> {
    match data {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    }
}
