//! Channel graph validation.
//!
//! Vertices are endpoint symbols, edges are declared channels. Under the
//! `dag` discipline the graph must admit a topological order.

use std::collections::{HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::api::{ChannelDeclaration, TopologyStruct};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("cycle detected through vertex [{0}]")]
    CycleDetected(String),
}

/// Outcome of validating a channel set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphVerdict {
    pub valid: bool,
    pub message: String,
}

impl GraphVerdict {
    fn valid() -> Self {
        Self {
            valid: true,
            message: String::new(),
        }
    }

    fn invalid(message: String) -> Self {
        Self {
            valid: false,
            message,
        }
    }
}

/// Directed multigraph of endpoint symbols.
#[derive(Debug, Default)]
pub struct ChannelGraph {
    graph: DiGraph<String, ()>,
    index_map: HashMap<String, NodeIndex>,
    insertion_order: Vec<NodeIndex>,
}

impl ChannelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn vertex(&mut self, symbol: &str) -> NodeIndex {
        if let Some(&idx) = self.index_map.get(symbol) {
            return idx;
        }
        let idx = self.graph.add_node(symbol.to_string());
        self.index_map.insert(symbol.to_string(), idx);
        self.insertion_order.push(idx);
        idx
    }

    /// Add an edge. Duplicate edges are kept.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let a = self.vertex(from);
        let b = self.vertex(to);
        self.graph.add_edge(a, b, ());
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Kahn's algorithm. Reports the first vertex, in insertion order, left
    /// with incoming edges. Self-loops count as cycles.
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut in_degree: HashMap<NodeIndex, usize> =
            self.graph.node_indices().map(|idx| (idx, 0)).collect();
        for edge in self.graph.edge_references() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<NodeIndex> = self
            .insertion_order
            .iter()
            .filter(|idx| in_degree.get(*idx).copied().unwrap_or(0) == 0)
            .copied()
            .collect();

        let mut visited = 0;
        while let Some(idx) = queue.pop_front() {
            visited += 1;
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&edge.target()) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        queue.push_back(edge.target());
                    }
                }
            }
        }

        if visited == self.graph.node_count() {
            return Ok(());
        }

        let vertex = self
            .insertion_order
            .iter()
            .find(|idx| in_degree.get(*idx).copied().unwrap_or(0) > 0)
            .and_then(|&idx| self.graph.node_weight(idx))
            .cloned()
            .unwrap_or_default();
        Err(GraphError::CycleDetected(vertex))
    }
}

/// Check the declared channels against a topology discipline.
///
/// Endpoints without a cluster or hub reference contribute no edge.
pub fn validate_channels(
    channels: &[ChannelDeclaration],
    discipline: TopologyStruct,
    default_namespace: &str,
) -> GraphVerdict {
    if discipline == TopologyStruct::Dcg {
        return GraphVerdict::valid();
    }

    let mut graph = ChannelGraph::new();
    for channel in channels {
        let from = channel.from.vertex_symbol(default_namespace);
        let to = channel.to.vertex_symbol(default_namespace);
        if let (Some(from), Some(to)) = (from, to) {
            graph.add_edge(&from, &to);
        }
    }

    match graph.check_acyclic() {
        Ok(()) => GraphVerdict::valid(),
        Err(GraphError::CycleDetected(vertex)) if vertex.is_empty() => GraphVerdict::invalid(
            format!("channel topology meet circle when topology-struct is [{discipline}]."),
        ),
        Err(err) => GraphVerdict::invalid(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChannelEndpoint;

    fn channel(name: &str, from: &str, to: &str) -> ChannelDeclaration {
        ChannelDeclaration {
            name: name.to_string(),
            from: ChannelEndpoint::cluster(from),
            to: ChannelEndpoint::cluster(to),
            ..Default::default()
        }
    }

    #[test]
    fn test_chain_is_valid() {
        let channels = vec![channel("c1", "a", "b"), channel("c2", "b", "c")];
        let verdict = validate_channels(&channels, TopologyStruct::Dag, "default");
        assert!(verdict.valid);
        assert!(verdict.message.is_empty());
    }

    #[test]
    fn test_cycle_is_invalid_under_dag() {
        let channels = vec![
            channel("c1", "a", "b"),
            channel("c2", "b", "c"),
            channel("c3", "c", "a"),
        ];
        let verdict = validate_channels(&channels, TopologyStruct::Dag, "default");
        assert!(!verdict.valid);
        assert_eq!(verdict.message, "cycle detected through vertex [a-default]");
    }

    #[test]
    fn test_cycle_is_valid_under_dcg() {
        let channels = vec![channel("c1", "a", "b"), channel("c2", "b", "a")];
        let verdict = validate_channels(&channels, TopologyStruct::Dcg, "default");
        assert!(verdict.valid);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let channels = vec![channel("c1", "a", "a")];
        assert!(!validate_channels(&channels, TopologyStruct::Dag, "default").valid);
    }

    #[test]
    fn test_duplicate_edges_are_not_a_cycle() {
        let channels = vec![channel("c1", "a", "b"), channel("c2", "a", "b")];
        assert!(validate_channels(&channels, TopologyStruct::Dag, "default").valid);

        let mut graph = ChannelGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "b");
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.check_acyclic().is_ok());
    }

    #[test]
    fn test_empty_channel_set_is_valid() {
        assert!(validate_channels(&[], TopologyStruct::Dag, "default").valid);
    }

    #[test]
    fn test_namespaces_separate_vertices() {
        let channels = vec![
            ChannelDeclaration {
                name: "c1".into(),
                from: ChannelEndpoint::cluster("a").in_namespace("x"),
                to: ChannelEndpoint::cluster("a").in_namespace("y"),
                ..Default::default()
            },
            ChannelDeclaration {
                name: "c2".into(),
                from: ChannelEndpoint::cluster("a").in_namespace("y"),
                to: ChannelEndpoint::hub("kafka"),
                ..Default::default()
            },
        ];
        assert!(validate_channels(&channels, TopologyStruct::Dag, "default").valid);
    }

    #[test]
    fn test_unnamed_vertex_uses_default_message() {
        let mut graph = ChannelGraph::new();
        graph.add_edge("", "");
        assert_eq!(
            graph.check_acyclic(),
            Err(GraphError::CycleDetected(String::new()))
        );
    }
}
