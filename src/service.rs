//! Request orchestration over a [`GraphStore`].
//!
//! The service owns the order of checks for every flow and translates store
//! failures into [`GraphError`]s. It holds no state of its own beyond the
//! store handle, so one instance can be shared across threads.

use std::{path::Path, sync::Arc};

use tracing::{debug, info, instrument};

use crate::{
    config::{StoreConfig, open_store},
    errors::{DagStoreError, GraphError},
    model::{GraphCreate, GraphId, GraphSnapshot},
    projection::{AdjacencyDirection, AdjacencyList, build_adjacency},
    store::{GraphStore, find_duplicate_edge, find_duplicate_node},
    validate,
};

pub struct GraphService<S: ?Sized = dyn GraphStore> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for GraphService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl GraphService {
    /// Service over the backend described by `cfg`.
    pub fn open(path: Option<&Path>, cfg: &StoreConfig) -> Result<Self, GraphError> {
        Ok(Self::new(open_store(path, cfg)?))
    }

    /// Service over a private in-memory SQLite database.
    pub fn in_memory() -> Result<Self, GraphError> {
        Self::open(None, &StoreConfig::sqlite())
    }
}

impl<S: GraphStore + ?Sized> GraphService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validate and persist a new graph.
    ///
    /// Checks run in a fixed order: non-empty node set, unique node names,
    /// edge endpoints and acyclicity, unique edges. Nothing is written unless
    /// all of them pass.
    #[instrument(skip_all, fields(nodes = request.nodes.len(), edges = request.edges.len()))]
    pub fn create_graph(&self, request: &GraphCreate) -> Result<GraphId, GraphError> {
        if request.nodes.is_empty() {
            return Err(GraphError::EmptyNodeSet);
        }
        if let Some(name) = find_duplicate_node(&request.nodes) {
            return Err(GraphError::DuplicateNode {
                name: name.to_string(),
            });
        }
        validate::check(&request.nodes, &request.edges)?;
        if let Some(edge) = find_duplicate_edge(&request.edges) {
            return Err(GraphError::DuplicateEdge { edge: edge.clone() });
        }

        let graph_id = self
            .store
            .create_atomically(&request.nodes, &request.edges)
            .map_err(|err| match err {
                DagStoreError::DuplicateEdge { edge } => GraphError::DuplicateEdge { edge },
                DagStoreError::DuplicateNode(name) => GraphError::DuplicateNode { name },
                other => GraphError::Storage(other),
            })?;
        info!(%graph_id, "graph created");
        Ok(graph_id)
    }

    #[instrument(skip(self))]
    pub fn read_graph(&self, graph_id: GraphId) -> Result<Arc<GraphSnapshot>, GraphError> {
        self.store.fetch(graph_id).map_err(|err| match err {
            DagStoreError::NotFound(_) => GraphError::GraphNotFound(graph_id),
            other => GraphError::Storage(other),
        })
    }

    /// Adjacency projection of one graph; `reversed` maps targets to sources.
    pub fn read_adjacency(
        &self,
        graph_id: GraphId,
        reversed: bool,
    ) -> Result<AdjacencyList, GraphError> {
        let snapshot = self.read_graph(graph_id)?;
        let list = build_adjacency(&snapshot, AdjacencyDirection::from_reversed(reversed))?;
        debug!(%graph_id, reversed, keys = list.len(), "adjacency built");
        Ok(list)
    }

    pub fn adjacency_list(&self, graph_id: GraphId) -> Result<AdjacencyList, GraphError> {
        self.read_adjacency(graph_id, false)
    }

    pub fn reverse_adjacency_list(&self, graph_id: GraphId) -> Result<AdjacencyList, GraphError> {
        self.read_adjacency(graph_id, true)
    }

    /// Delete a node and its incident edges, and the graph with its last node.
    #[instrument(skip(self))]
    pub fn delete_node(&self, graph_id: GraphId, node: &str) -> Result<(), GraphError> {
        let outcome = self
            .store
            .delete_node(graph_id, node)
            .map_err(|err| match err {
                DagStoreError::NotFound(_) => GraphError::GraphOrNodeNotFound {
                    graph_id,
                    node: node.to_string(),
                },
                other => GraphError::Storage(other),
            })?;
        if outcome.graph_removed {
            info!(%graph_id, "last node deleted, graph removed");
        }
        Ok(())
    }
}
