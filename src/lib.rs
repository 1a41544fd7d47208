//! Transactional storage for named directed acyclic graphs.
//!
//! A graph is created in one piece from node names and `(source, target)`
//! edges, is only accepted when acyclic, and afterwards only shrinks: deleting
//! a node removes its incident edges, and deleting the last node removes the
//! graph. [`GraphService`] is the entry point; [`GraphStore`] backends persist
//! graphs in SQLite ([`SqliteGraphStore`]) or in memory ([`MemoryGraphStore`]).
//!
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod bench_utils;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fault_injection;
pub mod integrity;
pub mod model;
pub mod names;
pub mod projection;
pub mod schema;
pub mod service;
pub mod store;
pub mod validate;

pub use crate::config::{BackendKind, SqliteConfig, StoreConfig, open_store};
pub use crate::errors::{DagStoreError, EdgeRole, ErrorKind, GraphError, ValidationFailure};
pub use crate::integrity::{IntegrityReport, run_integrity_checks};
pub use crate::model::{EdgeSpec, GraphCreate, GraphId, GraphSnapshot, NodeDeletion};
pub use crate::projection::{AdjacencyDirection, AdjacencyList, build_adjacency};
pub use crate::service::GraphService;
pub use crate::store::{GraphStore, MemoryGraphStore, SqliteGraphStore};
