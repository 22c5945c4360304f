//! `{{...}}` interpolation against block outputs and workflow variables.
//!
//! Two expression forms are supported:
//! - `{{normalizedId.path}}` reads from the outputs of a completed block
//! - `{{variable}}` or `{{variable.path}}` reads a workflow variable or input key
//!
//! Paths are dotted keys with optional array indices: `items[0].name` or `items.0.name`.

use std::{
    collections::{HashMap, HashSet},
    sync::LazyLock,
};

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::BlockError;

/// Format: `{{head}}` or `{{head.path.to.value}}`, surrounding whitespace allowed.
const TEMPLATE_PATTERN: &str = r"\{\{\s*([^{}]+?)\s*\}\}";

static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(TEMPLATE_PATTERN).unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed `{{...}}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The full placeholder text, braces included.
    pub raw: String,
    /// Block normalized id or variable name.
    pub head: String,
    pub path: Vec<PathSegment>,
}

impl Reference {
    fn parse(
        raw: &str,
        expr: &str,
    ) -> Self {
        let split = expr.find(['.', '[']).unwrap_or(expr.len());
        let head = expr[..split].trim().to_string();
        let mut path = Vec::new();
        for part in expr[split..].split('.').filter(|p| !p.is_empty()) {
            let mut rest = part;
            if let Some(open) = rest.find('[') {
                if open > 0 {
                    path.push(segment(&rest[..open]));
                }
                rest = &rest[open..];
                while let Some(stripped) = rest.strip_prefix('[') {
                    let Some(close) = stripped.find(']') else {
                        path.push(PathSegment::Key(rest.to_string()));
                        break;
                    };
                    path.push(segment(&stripped[..close]));
                    rest = &stripped[close + 1..];
                }
            } else {
                path.push(segment(rest));
            }
        }
        Self {
            raw: raw.to_string(),
            head,
            path,
        }
    }

    fn path_str(&self) -> String {
        self.path
            .iter()
            .map(|s| match s {
                PathSegment::Key(k) => k.clone(),
                PathSegment::Index(i) => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn segment(s: &str) -> PathSegment {
    match s.trim().parse::<usize>() {
        Ok(i) => PathSegment::Index(i),
        Err(_) => PathSegment::Key(s.trim().to_string()),
    }
}

/// Values visible to interpolation at the moment a block is about to run.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Outputs of completed blocks, keyed by normalized id and by id.
    outputs: HashMap<String, Value>,
    /// Every block id and normalized id of the workflow, completed or not.
    blocks: HashSet<String>,
    variables: Map<String, Value>,
}

impl Scope {
    pub fn new(variables: Map<String, Value>) -> Self {
        Self {
            variables,
            ..Default::default()
        }
    }

    pub fn add_block(
        &mut self,
        key: &str,
    ) {
        self.blocks.insert(key.to_string());
    }

    pub fn add_output(
        &mut self,
        key: &str,
        outputs: Value,
    ) {
        self.blocks.insert(key.to_string());
        self.outputs.insert(key.to_string(), outputs);
    }

    /// Look up a single reference.
    pub fn lookup(
        &self,
        reference: &Reference,
    ) -> Result<Value, BlockError> {
        if let Some(outputs) = self.outputs.get(&reference.head) {
            return walk(outputs, &reference.path).cloned().ok_or_else(|| {
                BlockError::missing_input(format!("path '{}' not found in outputs of block '{}'", reference.path_str(), reference.head))
            });
        }
        if self.blocks.contains(&reference.head) {
            return Err(BlockError::missing_input(format!("block '{}' has not completed", reference.head)));
        }
        if let Some(value) = self.variables.get(&reference.head) {
            return walk(value, &reference.path)
                .cloned()
                .ok_or_else(|| BlockError::missing_input(format!("path '{}' not found in variable '{}'", reference.path_str(), reference.head)));
        }
        Err(BlockError::missing_input(format!("unknown reference '{}'", reference.raw)))
    }
}

fn walk<'a>(
    value: &'a Value,
    path: &[PathSegment],
) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, seg| match (seg, current) {
        (PathSegment::Key(k), Value::Object(map)) => map.get(k),
        (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
        (PathSegment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
        _ => None,
    })
}

/// Render a JSON value the way it is spliced into a string.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// All references in `template`, in order of appearance.
pub fn references(template: &str) -> Vec<Reference> {
    TEMPLATE_RE.captures_iter(template).map(|caps| Reference::parse(&caps[0], &caps[1])).collect()
}

/// Resolve every placeholder in `template`.
/// Fails with `missing_input` listing every reference that could not be resolved.
pub fn resolve(
    template: &str,
    scope: &Scope,
) -> Result<String, BlockError> {
    let mut result = String::with_capacity(template.len());
    let mut errors: Vec<String> = Vec::new();
    let mut last = 0;

    for caps in TEMPLATE_RE.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        result.push_str(&template[last..whole.start()]);
        let reference = Reference::parse(whole.as_str(), &caps[1]);
        match scope.lookup(&reference) {
            Ok(value) => result.push_str(&render(&value)),
            Err(err) => errors.push(err.message),
        }
        last = whole.end();
    }
    result.push_str(&template[last..]);

    if !errors.is_empty() {
        return Err(BlockError::missing_input(errors.join(", ")));
    }
    Ok(result)
}

/// Resolve placeholders inside a JSON value recursively.
///
/// A string made of exactly one placeholder resolves to the referenced value
/// itself, so `"{{a.items}}"` yields an array rather than its JSON text.
pub fn resolve_value(
    value: &Value,
    scope: &Scope,
) -> Result<Value, BlockError> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Some(caps) = TEMPLATE_RE.captures(trimmed) {
                if caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == trimmed.len()) {
                    return scope.lookup(&Reference::parse(&caps[0], &caps[1]));
                }
            }
            resolve(s, scope).map(Value::String)
        }
        Value::Array(items) => items.iter().map(|v| resolve_value(v, scope)).collect::<Result<Vec<_>, _>>().map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| resolve_value(v, scope).map(|rv| (k.clone(), rv)))
            .collect::<Result<Map<_, _>, _>>()
            .map(Value::Object),
        _ => Ok(value.clone()),
    }
}

/// Collect references from every string inside a JSON value.
pub fn value_references(value: &Value) -> Vec<Reference> {
    match value {
        Value::String(s) => references(s),
        Value::Array(items) => items.iter().flat_map(value_references).collect(),
        Value::Object(map) => map.values().flat_map(value_references).collect(),
        _ => Vec::new(),
    }
}
