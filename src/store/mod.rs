//! Durable graph storage.
//!
//! [`GraphStore`] is the seam between the service and a backend. Every method
//! is one unit of atomicity: its effects become visible together or not at all.

mod memory_store;
pub mod pool;
pub(crate) mod sqlite_store;
pub mod transaction;

use std::sync::Arc;

use ahash::AHashSet;

pub use memory_store::MemoryGraphStore;
pub use sqlite_store::SqliteGraphStore;

use crate::{
    config::BackendKind,
    errors::DagStoreError,
    model::{EdgeSpec, GraphId, GraphSnapshot, NodeDeletion},
};

pub trait GraphStore: Send + Sync {
    fn backend_kind(&self) -> BackendKind;

    /// Persist a new graph with all of its nodes and edges.
    ///
    /// The caller has already checked the candidate for cycles and unknown
    /// endpoints. Duplicate edges fail with [`DagStoreError::DuplicateEdge`]
    /// and duplicate node names with [`DagStoreError::DuplicateNode`]; in both
    /// cases nothing from the call is persisted.
    fn create_atomically(
        &self,
        nodes: &[String],
        edges: &[EdgeSpec],
    ) -> Result<GraphId, DagStoreError>;

    /// Consistent snapshot of one graph, or [`DagStoreError::NotFound`].
    fn fetch(&self, graph_id: GraphId) -> Result<Arc<GraphSnapshot>, DagStoreError>;

    /// Delete a node, its incident edges and, if it was the last node, the graph.
    ///
    /// [`DagStoreError::NotFound`] when either the graph or the node is missing.
    fn delete_node(&self, graph_id: GraphId, node: &str) -> Result<NodeDeletion, DagStoreError>;

    fn exists_any_node(&self, graph_id: GraphId) -> Result<bool, DagStoreError>;

    fn graph_count(&self) -> Result<usize, DagStoreError>;
}

/// First node name that occurs more than once, in input order.
pub fn find_duplicate_node<S: AsRef<str>>(nodes: &[S]) -> Option<&str> {
    let mut seen = AHashSet::with_capacity(nodes.len());
    nodes
        .iter()
        .map(|name| name.as_ref())
        .find(|name| !seen.insert(*name))
}

/// First edge that repeats an earlier `(source, target)` pair.
pub fn find_duplicate_edge(edges: &[EdgeSpec]) -> Option<&EdgeSpec> {
    let mut seen = AHashSet::with_capacity(edges.len());
    edges
        .iter()
        .find(|edge| !seen.insert((edge.source.as_str(), edge.target.as_str())))
}

/// Rejects inputs the store must never partially persist.
pub(crate) fn precheck_create(nodes: &[String], edges: &[EdgeSpec]) -> Result<(), DagStoreError> {
    if let Some(name) = find_duplicate_node(nodes) {
        return Err(DagStoreError::duplicate_node(name));
    }
    if let Some(edge) = find_duplicate_edge(edges) {
        return Err(DagStoreError::duplicate_edge(edge));
    }
    Ok(())
}
