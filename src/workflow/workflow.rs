//! Runtime workflow representation using a directed graph.
//!
//! The graph is immutable once built; execution state lives in the dispatcher.

use std::collections::HashMap;

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::{
    BlockflowError, Result, WorkflowModel,
    workflow::block::{Block, BlockId},
};

/// Runtime edge between two blocks.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub source_output: Option<String>,
    pub target_input: Option<String>,
}

/// Validated workflow ready for execution.
#[derive(Debug, Clone)]
pub struct Workflow {
    graph: DiGraph<Block, Connection>,
    index: HashMap<BlockId, NodeIndex>,
    /// Block ids in declaration order.
    order: Vec<BlockId>,
    output_block: Option<BlockId>,
}

impl Workflow {
    /// Output a human-readable representation of the workflow graph
    pub fn schema(&self) -> String {
        let graph = &self.graph;
        let mut lines = Vec::new();

        lines.push("=== Workflow Graph ===".to_string());
        lines.push(format!("Blocks: {}, Connections: {}", graph.node_count(), graph.edge_count()));

        for idx in graph.node_indices() {
            let block = &graph[idx];
            let outgoing: Vec<String> = graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| {
                    let port = e.weight().source_output.as_deref().unwrap_or("output");
                    format!("{}({})", graph[e.target()].id, port)
                })
                .collect();

            let targets = if outgoing.is_empty() { "(end)".to_string() } else { outgoing.join(", ") };
            lines.push(format!("[{}] {} ({}) -> {}", block.id, block.name, block.block_type.as_ref(), targets));
        }

        lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Blocks in declaration order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.order.iter().filter_map(|id| self.get_block(id))
    }

    pub fn get_block(
        &self,
        id: &str,
    ) -> Option<&Block> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    /// Number of inbound connections, parallel connections counted separately.
    pub fn in_degree(
        &self,
        id: &str,
    ) -> usize {
        self.index.get(id).map(|idx| self.graph.edges_directed(*idx, Direction::Incoming).count()).unwrap_or(0)
    }

    /// Target block ids of every outbound connection, one entry per connection.
    pub fn successors(
        &self,
        id: &str,
    ) -> Vec<BlockId> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut targets: Vec<(usize, BlockId)> =
            self.graph.edges_directed(*idx, Direction::Outgoing).map(|e| (e.id().index(), self.graph[e.target()].id.clone())).collect();
        // petgraph walks outgoing edges newest first
        targets.sort_by_key(|(edge, _)| *edge);
        targets.into_iter().map(|(_, id)| id).collect()
    }

    /// Blocks with no outbound connection.
    pub fn is_terminal(
        &self,
        id: &str,
    ) -> bool {
        self.index.get(id).is_some_and(|idx| self.graph.edges_directed(*idx, Direction::Outgoing).next().is_none())
    }

    /// The designated output block, if the workflow names one.
    pub fn output_block(&self) -> Option<&Block> {
        self.output_block.as_deref().and_then(|id| self.get_block(id))
    }
}

impl TryFrom<&WorkflowModel> for Workflow {
    type Error = BlockflowError;

    fn try_from(model: &WorkflowModel) -> Result<Self> {
        let mut graph: DiGraph<Block, Connection> = DiGraph::new();
        let mut index = HashMap::new();
        let mut order = Vec::with_capacity(model.blocks.len());

        for block_model in model.blocks.iter() {
            let block = Block::new(block_model).map_err(|e| BlockflowError::Block(format!("block '{}': {}", block_model.id, e)))?;
            let id = block.id.clone();
            if index.contains_key(&id) {
                return Err(BlockflowError::Block(format!("duplicate block id '{}'", id)));
            }
            let idx = graph.add_node(block);
            index.insert(id.clone(), idx);
            order.push(id);
        }
        for conn in model.connections.iter() {
            let source = index
                .get(&conn.source_block_id)
                .ok_or(BlockflowError::Workflow(format!("source block {} not found", conn.source_block_id)))?;
            let target = index
                .get(&conn.target_block_id)
                .ok_or(BlockflowError::Workflow(format!("target block {} not found", conn.target_block_id)))?;
            graph.add_edge(
                *source,
                *target,
                Connection {
                    id: conn.connection_id(),
                    source_output: conn.source_output.clone(),
                    target_input: conn.target_input.clone(),
                },
            );
        }
        Ok(Self {
            graph,
            index,
            order,
            output_block: model.output_block_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn diamond() -> WorkflowModel {
        serde_json::from_value(json!({
            "blocks": [
                {"id": "a", "type": "variable"},
                {"id": "b", "type": "variable"},
                {"id": "c", "type": "variable"},
                {"id": "d", "type": "variable"}
            ],
            "connections": [
                {"sourceBlockId": "a", "targetBlockId": "b"},
                {"sourceBlockId": "a", "targetBlockId": "c"},
                {"sourceBlockId": "b", "targetBlockId": "d"},
                {"sourceBlockId": "c", "targetBlockId": "d"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_graph_shape() {
        let workflow = Workflow::try_from(&diamond()).unwrap();
        assert_eq!(workflow.len(), 4);
        assert_eq!(workflow.in_degree("a"), 0);
        assert_eq!(workflow.in_degree("d"), 2);
        assert_eq!(workflow.successors("a"), vec!["b".to_string(), "c".to_string()]);
        assert!(workflow.is_terminal("d"));
        assert!(!workflow.is_terminal("b"));
        assert!(workflow.schema().contains("[d] d (variable) -> (end)"));
    }

    #[test]
    fn test_dangling_connection_is_rejected() {
        let mut model = diamond();
        model.connections.push(crate::ConnectionModel::new("a", "zz"));
        assert!(Workflow::try_from(&model).is_err());
    }
}
