//! Structural validation of a workflow before it runs.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
};

use petgraph::{
    Direction,
    algo::has_path_connecting,
    graph::{DiGraph, NodeIndex},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    model::{BlockModel, WorkflowModel},
    workflow::{block::Block, template},
};

const DEFAULT_INPUT_PORT: &str = "input";
const DEFAULT_OUTPUT_PORT: &str = "output";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidationErrorType {
    Schema,
    Cycle,
    TypeMismatch,
    MissingInput,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub kind: ValidationErrorType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

impl ValidationError {
    fn new(
        kind: ValidationErrorType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            block_id: None,
            connection_id: None,
        }
    }

    fn block(
        mut self,
        block_id: &str,
    ) -> Self {
        self.block_id = Some(block_id.to_string());
        self
    }

    fn connection(
        mut self,
        connection_id: String,
    ) -> Self {
        self.connection_id = Some(connection_id);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_ref(), self.message)
    }
}

/// Check a workflow definition. An empty result means it can run.
pub fn validate(workflow: &WorkflowModel) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if workflow.blocks.is_empty() {
        errors.push(ValidationError::new(ValidationErrorType::Schema, "workflow has no blocks"));
        return errors;
    }

    // block identity and typed config
    let mut ids: HashMap<&str, usize> = HashMap::new();
    let mut normalized: HashMap<String, &str> = HashMap::new();
    for (i, block) in workflow.blocks.iter().enumerate() {
        if block.id.trim().is_empty() {
            errors.push(ValidationError::new(ValidationErrorType::Schema, format!("block #{i} has an empty id")));
            continue;
        }
        if ids.insert(block.id.as_str(), i).is_some() {
            errors.push(ValidationError::new(ValidationErrorType::Schema, format!("duplicate block id '{}'", block.id)).block(&block.id));
            continue;
        }
        let key = block.normalized_id();
        if let Some(other) = normalized.insert(key.clone(), block.id.as_str()) {
            errors.push(
                ValidationError::new(ValidationErrorType::Schema, format!("blocks '{}' and '{}' share the normalized id '{}'", other, block.id, key))
                    .block(&block.id),
            );
        }
        if let Err(err) = Block::new(block) {
            errors.push(ValidationError::new(ValidationErrorType::Schema, format!("block '{}': {}", block.id, err)).block(&block.id));
        }
    }
    // references resolve ids and normalized ids from one namespace
    for (key, owner) in &normalized {
        if let Some(&i) = ids.get(key.as_str()) {
            let other = workflow.blocks[i].id.as_str();
            if other != *owner {
                errors.push(
                    ValidationError::new(ValidationErrorType::Schema, format!("normalized id '{}' of block '{}' collides with block id '{}'", key, owner, other))
                        .block(owner),
                );
            }
        }
    }

    validate_variables(workflow, &mut errors);

    if let Some(output) = &workflow.output_block_id {
        if !ids.contains_key(output.as_str()) {
            errors.push(ValidationError::new(ValidationErrorType::Schema, format!("output block '{}' does not exist", output)).block(output));
        }
    }

    // connections
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..workflow.blocks.len()).map(|i| graph.add_node(i)).collect();
    for conn in workflow.connections.iter() {
        let cid = conn.connection_id();
        let source = ids.get(conn.source_block_id.as_str()).copied();
        let target = ids.get(conn.target_block_id.as_str()).copied();
        if source.is_none() {
            errors.push(ValidationError::new(ValidationErrorType::Schema, format!("connection '{}' has unknown source block '{}'", cid, conn.source_block_id)).connection(cid.clone()));
        }
        if target.is_none() {
            errors.push(ValidationError::new(ValidationErrorType::Schema, format!("connection '{}' has unknown target block '{}'", cid, conn.target_block_id)).connection(cid.clone()));
        }
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };
        if let Some(port) = &conn.source_output {
            let block = &workflow.blocks[source];
            if !has_port(&block.outputs, DEFAULT_OUTPUT_PORT, port) {
                errors.push(
                    ValidationError::new(ValidationErrorType::Schema, format!("block '{}' has no output port '{}'", block.id, port))
                        .block(&block.id)
                        .connection(cid.clone()),
                );
            }
        }
        if let Some(port) = &conn.target_input {
            let block = &workflow.blocks[target];
            if !has_port(&block.inputs, DEFAULT_INPUT_PORT, port) {
                errors.push(
                    ValidationError::new(ValidationErrorType::Schema, format!("block '{}' has no input port '{}'", block.id, port))
                        .block(&block.id)
                        .connection(cid.clone()),
                );
            }
        }
        graph.add_edge(nodes[source], nodes[target], ());
    }

    // Kahn's algorithm in declaration order
    let mut in_degree: Vec<usize> = nodes.iter().map(|n| graph.neighbors_directed(*n, Direction::Incoming).count()).collect();
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|i| in_degree[*i] == 0).collect();
    let mut visited = vec![false; nodes.len()];
    while let Some(i) = queue.pop_front() {
        visited[i] = true;
        for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = graph[next];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                queue.push_back(j);
            }
        }
    }
    if let Some(first) = visited.iter().position(|v| !v) {
        let block = &workflow.blocks[first];
        errors.push(ValidationError::new(ValidationErrorType::Cycle, format!("cycle detected at block '{}'", block.id)).block(&block.id));
        return errors;
    }

    validate_references(workflow, &graph, &nodes, &mut errors);

    errors
}

/// Check an input payload against declared variable types.
pub fn validate_input(
    workflow: &WorkflowModel,
    input: &Value,
) -> Vec<ValidationError> {
    let Value::Object(fields) = input else {
        return Vec::new();
    };
    workflow
        .variables
        .iter()
        .filter_map(|var| {
            let value = fields.get(&var.name)?;
            (!var.kind.accepts(value)).then(|| {
                ValidationError::new(ValidationErrorType::TypeMismatch, format!("input '{}' must be of type {}", var.name, var.kind.as_ref()))
            })
        })
        .collect()
}

fn has_port(
    declared: &[String],
    default: &str,
    port: &str,
) -> bool {
    port == default || declared.iter().any(|p| p == port)
}

fn validate_variables(
    workflow: &WorkflowModel,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    for var in workflow.variables.iter() {
        if !seen.insert(var.name.as_str()) {
            errors.push(ValidationError::new(ValidationErrorType::Schema, format!("duplicate variable '{}'", var.name)));
            continue;
        }
        if let Some(default) = &var.default_value {
            if !var.kind.accepts(default) {
                errors.push(ValidationError::new(
                    ValidationErrorType::TypeMismatch,
                    format!("default value of variable '{}' must be of type {}", var.name, var.kind.as_ref()),
                ));
            }
        }
    }
}

/// A block may only reference blocks that are upstream of it.
fn validate_references(
    workflow: &WorkflowModel,
    graph: &DiGraph<usize, ()>,
    nodes: &[NodeIndex],
    errors: &mut Vec<ValidationError>,
) {
    let mut keys: HashMap<String, usize> = HashMap::new();
    for (i, block) in workflow.blocks.iter().enumerate() {
        keys.insert(block.normalized_id(), i);
        keys.insert(block.id.clone(), i);
    }

    for (i, block) in workflow.blocks.iter().enumerate() {
        let mut reported = HashSet::new();
        for reference in template::value_references(&block.config) {
            let Some(&source) = keys.get(&reference.head) else {
                continue;
            };
            let upstream = source != i && has_path_connecting(graph, nodes[source], nodes[i], None);
            if !upstream && reported.insert(reference.head.clone()) {
                errors.push(unreachable_reference(block, &reference.head));
            }
        }
    }
}

fn unreachable_reference(
    block: &BlockModel,
    head: &str,
) -> ValidationError {
    ValidationError::new(
        ValidationErrorType::MissingInput,
        format!("block '{}' references '{}', which is not upstream of it", block.id, head),
    )
    .block(&block.id)
}
