use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of a stored graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub i64);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for GraphId {
    fn from(value: i64) -> Self {
        GraphId(value)
    }
}

/// A directed edge addressed by node names.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
}

impl EdgeSpec {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Payload of a create request: every node and edge of the new graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCreate {
    pub nodes: Vec<String>,
    pub edges: Vec<EdgeSpec>,
}

impl GraphCreate {
    pub fn new<N, E, S, T>(nodes: N, edges: E) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        E: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            edges: edges
                .into_iter()
                .map(|(source, target)| EdgeSpec::new(source, target))
                .collect(),
        }
    }
}

/// Materialized contents of one graph as seen by a single consistent read.
///
/// Nodes and edges are listed in creation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub id: GraphId,
    pub nodes: Vec<String>,
    pub edges: Vec<EdgeSpec>,
}

impl GraphSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.iter().any(|node| node == name)
    }

    pub fn contains_edge(&self, source: &str, target: &str) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.source == source && edge.target == target)
    }
}

/// Result of a successful cascading node deletion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeDeletion {
    pub removed_edges: usize,
    /// The deleted node was the last one, so the graph itself is gone.
    pub graph_removed: bool,
}
