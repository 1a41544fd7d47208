use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::{
    config::BackendKind,
    errors::DagStoreError,
    model::{EdgeSpec, GraphId, GraphSnapshot, NodeDeletion},
};

use super::{GraphStore, precheck_create};

type NodeKey = usize;

#[derive(Debug)]
struct NodeRecord {
    graph_id: GraphId,
    name: String,
}

#[derive(Debug)]
struct EdgeRecord {
    graph_id: GraphId,
    source_id: NodeKey,
    target_id: NodeKey,
}

/// Every record owned by one graph. Deleted slots become `None` so keys stay
/// stable.
#[derive(Debug)]
struct GraphArena {
    id: GraphId,
    nodes: Vec<Option<NodeRecord>>,
    edges: Vec<Option<EdgeRecord>>,
    by_name: AHashMap<String, NodeKey>,
    live_nodes: usize,
    /// Set under the graph's write lock when its last node goes away.
    removed: bool,
}

impl GraphArena {
    fn build(id: GraphId, nodes: &[String], edges: &[EdgeSpec]) -> Result<Self, DagStoreError> {
        let mut arena = Self {
            id,
            nodes: Vec::with_capacity(nodes.len()),
            edges: Vec::with_capacity(edges.len()),
            by_name: AHashMap::with_capacity(nodes.len()),
            live_nodes: 0,
            removed: false,
        };
        for name in nodes {
            let key = arena.nodes.len();
            arena.nodes.push(Some(NodeRecord {
                graph_id: id,
                name: name.clone(),
            }));
            arena.by_name.insert(name.clone(), key);
            arena.live_nodes += 1;
        }
        for edge in edges {
            let source_id = arena.key_of(&edge.source)?;
            let target_id = arena.key_of(&edge.target)?;
            arena.edges.push(Some(EdgeRecord {
                graph_id: id,
                source_id,
                target_id,
            }));
        }
        Ok(arena)
    }

    fn key_of(&self, name: &str) -> Result<NodeKey, DagStoreError> {
        self.by_name.get(name).copied().ok_or_else(|| {
            DagStoreError::integrity(format!("edge endpoint {name} is not a node of graph {}", self.id))
        })
    }

    fn node_name(&self, key: NodeKey) -> Result<&str, DagStoreError> {
        self.nodes
            .get(key)
            .and_then(Option::as_ref)
            .map(|node| node.name.as_str())
            .ok_or_else(|| {
                DagStoreError::integrity(format!("graph {} has an edge to a deleted node", self.id))
            })
    }

    fn snapshot(&self) -> Result<GraphSnapshot, DagStoreError> {
        let nodes = self
            .nodes
            .iter()
            .flatten()
            .map(|node| {
                debug_assert_eq!(node.graph_id, self.id);
                node.name.clone()
            })
            .collect();
        let mut edges = Vec::new();
        for edge in self.edges.iter().flatten() {
            debug_assert_eq!(edge.graph_id, self.id);
            edges.push(EdgeSpec::new(
                self.node_name(edge.source_id)?,
                self.node_name(edge.target_id)?,
            ));
        }
        Ok(GraphSnapshot {
            id: self.id,
            nodes,
            edges,
        })
    }

    /// Removes the node and its incident edges; returns the removed edge count.
    fn remove_node(&mut self, key: NodeKey) -> usize {
        let mut removed_edges = 0;
        for slot in self.edges.iter_mut() {
            let incident = slot
                .as_ref()
                .is_some_and(|edge| edge.source_id == key || edge.target_id == key);
            if incident {
                *slot = None;
                removed_edges += 1;
            }
        }
        if let Some(node) = self.nodes[key].take() {
            self.by_name.remove(&node.name);
            self.live_nodes -= 1;
        }
        removed_edges
    }
}

/// In-process [`GraphStore`] holding each graph in its own arena.
///
/// The registry lock is only held to add, look up or drop a graph handle;
/// all reads and writes of graph contents take that graph's own lock, so
/// operations on different graphs never wait for each other.
#[derive(Default)]
pub struct MemoryGraphStore {
    graphs: RwLock<AHashMap<GraphId, Arc<RwLock<GraphArena>>>>,
    last_id: AtomicI64,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, graph_id: GraphId) -> Result<Arc<RwLock<GraphArena>>, DagStoreError> {
        self.graphs
            .read()
            .get(&graph_id)
            .cloned()
            .ok_or_else(|| DagStoreError::not_found(format!("graph {graph_id}")))
    }
}

impl GraphStore for MemoryGraphStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    #[instrument(skip_all, fields(nodes = nodes.len(), edges = edges.len()))]
    fn create_atomically(
        &self,
        nodes: &[String],
        edges: &[EdgeSpec],
    ) -> Result<GraphId, DagStoreError> {
        precheck_create(nodes, edges)?;
        let graph_id = GraphId(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        // Built off to the side and published in one step.
        let arena = GraphArena::build(graph_id, nodes, edges)?;
        self.graphs
            .write()
            .insert(graph_id, Arc::new(RwLock::new(arena)));
        debug!(%graph_id, "graph published");
        Ok(graph_id)
    }

    fn fetch(&self, graph_id: GraphId) -> Result<Arc<GraphSnapshot>, DagStoreError> {
        let handle = self.handle(graph_id)?;
        let arena = handle.read();
        if arena.removed {
            return Err(DagStoreError::not_found(format!("graph {graph_id}")));
        }
        Ok(Arc::new(arena.snapshot()?))
    }

    #[instrument(skip(self))]
    fn delete_node(&self, graph_id: GraphId, node: &str) -> Result<NodeDeletion, DagStoreError> {
        let handle = self.handle(graph_id)?;
        let outcome = {
            let mut arena = handle.write();
            if arena.removed {
                return Err(DagStoreError::not_found(format!("graph {graph_id}")));
            }
            let Some(&key) = arena.by_name.get(node) else {
                return Err(DagStoreError::not_found(format!(
                    "node {node} in graph {graph_id}"
                )));
            };
            let removed_edges = arena.remove_node(key);
            let graph_removed = arena.live_nodes == 0;
            if graph_removed {
                arena.removed = true;
            }
            NodeDeletion {
                removed_edges,
                graph_removed,
            }
        };
        if outcome.graph_removed {
            self.graphs.write().remove(&graph_id);
        }
        debug!(
            removed_edges = outcome.removed_edges,
            graph_removed = outcome.graph_removed,
            "node deleted"
        );
        Ok(outcome)
    }

    fn exists_any_node(&self, graph_id: GraphId) -> Result<bool, DagStoreError> {
        match self.handle(graph_id) {
            Ok(handle) => {
                let arena = handle.read();
                Ok(!arena.removed && arena.live_nodes > 0)
            }
            Err(DagStoreError::NotFound(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    fn graph_count(&self) -> Result<usize, DagStoreError> {
        Ok(self.graphs.read().len())
    }
}
