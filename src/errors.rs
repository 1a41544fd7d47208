use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::{EdgeSpec, GraphId};

/// Storage and infrastructure failures raised by the graph stores.
#[derive(Debug, Error)]
pub enum DagStoreError {
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("transaction error: {0}")]
    TransactionError(String),
    #[error("connection pool timeout: {0}")]
    PoolTimeout(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("duplicate edge {}->{}", .edge.source, .edge.target)]
    DuplicateEdge { edge: EdgeSpec },
    #[error("duplicate node {0}")]
    DuplicateNode(String),
    #[error("integrity error: {0}")]
    IntegrityError(String),
    #[error("fault injected: {0}")]
    FaultInjected(String),
}

impl DagStoreError {
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        DagStoreError::ConnectionError(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        DagStoreError::SchemaError(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        DagStoreError::QueryError(msg.into())
    }

    pub fn transaction<T: Into<String>>(msg: T) -> Self {
        DagStoreError::TransactionError(msg.into())
    }

    pub fn pool_timeout<T: Into<String>>(msg: T) -> Self {
        DagStoreError::PoolTimeout(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        DagStoreError::NotFound(msg.into())
    }

    pub fn duplicate_edge(edge: &EdgeSpec) -> Self {
        DagStoreError::DuplicateEdge { edge: edge.clone() }
    }

    pub fn duplicate_node<T: Into<String>>(name: T) -> Self {
        DagStoreError::DuplicateNode(name.into())
    }

    pub fn integrity<T: Into<String>>(msg: T) -> Self {
        DagStoreError::IntegrityError(msg.into())
    }

    pub fn fault_injection<T: Into<String>>(msg: T) -> Self {
        DagStoreError::FaultInjected(msg.into())
    }
}

/// Which endpoint of an edge an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeRole {
    Source,
    Target,
}

impl EdgeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeRole::Source => "source",
            EdgeRole::Target => "target",
        }
    }
}

impl fmt::Display for EdgeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a failed acyclicity check.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("Node {name} not found in the graph")]
    UnknownNode {
        role: EdgeRole,
        name: String,
        edge_index: usize,
    },
    #[error("Graph is not DAG")]
    NotADag,
}

/// Coarse classification used by transports to pick a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller can fix the request and retry.
    Input,
    /// The addressed graph or node does not exist.
    NotFound,
    Internal,
}

/// Typed failures returned by [`crate::service::GraphService`].
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph must have at least one node")]
    EmptyNodeSet,
    #[error("Node {name} not found in the graph")]
    UnknownNode {
        role: EdgeRole,
        name: String,
        edge_index: usize,
    },
    #[error("Graph is not DAG")]
    NotADag,
    #[error("There are duplicate edges in the graph")]
    DuplicateEdge { edge: EdgeSpec },
    #[error("There are duplicate nodes in the graph")]
    DuplicateNode { name: String },
    #[error("{reason}: {name:?}")]
    InvalidName {
        loc: Vec<String>,
        name: String,
        reason: &'static str,
    },
    #[error("Graph entity not found")]
    GraphNotFound(GraphId),
    #[error("Graph entity not found")]
    GraphOrNodeNotFound { graph_id: GraphId, node: String },
    #[error("storage error: {0}")]
    Storage(#[from] DagStoreError),
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::EmptyNodeSet
            | GraphError::UnknownNode { .. }
            | GraphError::NotADag
            | GraphError::DuplicateEdge { .. }
            | GraphError::DuplicateNode { .. }
            | GraphError::InvalidName { .. } => ErrorKind::Input,
            GraphError::GraphNotFound(_) | GraphError::GraphOrNodeNotFound { .. } => {
                ErrorKind::NotFound
            }
            GraphError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Location of the offending request field, e.g. `["body", "edges", "1", "target"]`.
    ///
    /// Empty for failures that are not tied to a request field.
    pub fn field_path(&self) -> Vec<String> {
        match self {
            GraphError::EmptyNodeSet | GraphError::DuplicateNode { .. } => loc(&["body", "nodes"]),
            GraphError::UnknownNode {
                role, edge_index, ..
            } => vec![
                "body".to_string(),
                "edges".to_string(),
                edge_index.to_string(),
                role.as_str().to_string(),
            ],
            GraphError::NotADag | GraphError::DuplicateEdge { .. } => loc(&["body", "edges"]),
            GraphError::InvalidName { loc, .. } => loc.clone(),
            GraphError::GraphNotFound(_)
            | GraphError::GraphOrNodeNotFound { .. }
            | GraphError::Storage(_) => Vec::new(),
        }
    }
}

impl From<ValidationFailure> for GraphError {
    fn from(failure: ValidationFailure) -> Self {
        match failure {
            ValidationFailure::UnknownNode {
                role,
                name,
                edge_index,
            } => GraphError::UnknownNode {
                role,
                name,
                edge_index,
            },
            ValidationFailure::NotADag => GraphError::NotADag,
        }
    }
}

fn loc(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}
