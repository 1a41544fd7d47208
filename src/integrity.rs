//! Offline consistency checks over a SQLite store.
//!
//! Every check reads through its own connection and reports counts rather
//! than failing on the first problem.

use std::{fmt, result};

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::warn;

use crate::{
    errors::{DagStoreError, ValidationFailure},
    model::GraphId,
    store::SqliteGraphStore,
    store::sqlite_store::load_snapshot,
    store::transaction::TransactionGuard,
    validate,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub total_graphs: i64,
    pub total_nodes: i64,
    pub total_edges: i64,
    /// Edges whose source or target row is gone.
    pub orphan_edges: i64,
    /// Edges whose endpoints belong to a different graph than the edge.
    pub cross_graph_edges: i64,
    pub duplicate_edges: i64,
    /// Graphs with no nodes; these must never be visible.
    pub empty_graphs: i64,
    pub cyclic_graphs: i64,
}

impl IntegrityReport {
    pub fn merge(&mut self, other: &IntegrityReport) {
        self.total_graphs = self.total_graphs.max(other.total_graphs);
        self.total_nodes = self.total_nodes.max(other.total_nodes);
        self.total_edges = self.total_edges.max(other.total_edges);
        self.orphan_edges += other.orphan_edges;
        self.cross_graph_edges += other.cross_graph_edges;
        self.duplicate_edges += other.duplicate_edges;
        self.empty_graphs += other.empty_graphs;
        self.cyclic_graphs += other.cyclic_graphs;
    }

    pub fn has_issues(&self) -> bool {
        self.orphan_edges > 0
            || self.cross_graph_edges > 0
            || self.duplicate_edges > 0
            || self.empty_graphs > 0
            || self.cyclic_graphs > 0
    }
}

#[derive(Debug)]
pub struct IntegrityError {
    pub report: IntegrityReport,
    pub source: Option<DagStoreError>,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(err) => write!(f, "integrity check failed: {err}"),
            None => write!(f, "integrity violations detected"),
        }
    }
}

impl std::error::Error for IntegrityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &dyn std::error::Error)
    }
}

pub fn validate_referential_integrity(
    store: &SqliteGraphStore,
) -> Result<IntegrityReport, DagStoreError> {
    let conn = store.connection()?;
    let mut report = base_report(&conn)?;
    report.orphan_edges = query_single(
        &conn,
        "SELECT COUNT(*) FROM edges e \
         LEFT JOIN nodes src ON src.id = e.source_id \
         LEFT JOIN nodes dst ON dst.id = e.target_id \
         WHERE src.id IS NULL OR dst.id IS NULL",
    )?;
    report.cross_graph_edges = query_single(
        &conn,
        "SELECT COUNT(*) FROM edges e \
         JOIN nodes src ON src.id = e.source_id \
         JOIN nodes dst ON dst.id = e.target_id \
         WHERE src.graph_id != e.graph_id OR dst.graph_id != e.graph_id",
    )?;
    Ok(report)
}

pub fn validate_no_duplicate_edges(
    store: &SqliteGraphStore,
) -> Result<IntegrityReport, DagStoreError> {
    let conn = store.connection()?;
    let mut report = base_report(&conn)?;
    report.duplicate_edges = query_single(
        &conn,
        "SELECT COALESCE(SUM(cnt - 1), 0) FROM ( \
             SELECT COUNT(*) AS cnt FROM edges \
             GROUP BY graph_id, source_id, target_id \
             HAVING cnt > 1 \
         )",
    )?;
    Ok(report)
}

pub fn validate_no_empty_graphs(
    store: &SqliteGraphStore,
) -> Result<IntegrityReport, DagStoreError> {
    let conn = store.connection()?;
    let mut report = base_report(&conn)?;
    report.empty_graphs = query_single(
        &conn,
        "SELECT COUNT(*) FROM graphs g \
         WHERE NOT EXISTS (SELECT 1 FROM nodes n WHERE n.graph_id = g.id)",
    )?;
    Ok(report)
}

/// Re-runs the acyclicity check over every stored graph.
pub fn validate_acyclic(store: &SqliteGraphStore) -> Result<IntegrityReport, DagStoreError> {
    let conn = store.connection()?;
    let mut report = base_report(&conn)?;
    for graph_id in graph_ids(&conn)? {
        let snapshot =
            TransactionGuard::deferred(&conn)?.run(|conn| load_snapshot(conn, graph_id))?;
        let outcome = validate::check(&snapshot.nodes, &snapshot.edges);
        if let Err(ValidationFailure::NotADag) = outcome {
            warn!(%graph_id, "stored graph fails the acyclicity check");
            report.cyclic_graphs += 1;
        }
    }
    Ok(report)
}

pub fn run_integrity_checks(store: &SqliteGraphStore) -> Result<IntegrityReport, DagStoreError> {
    let mut report = IntegrityReport::default();
    report.merge(&validate_referential_integrity(store)?);
    report.merge(&validate_no_duplicate_edges(store)?);
    report.merge(&validate_no_empty_graphs(store)?);
    report.merge(&validate_acyclic(store)?);
    Ok(report)
}

pub fn run_strict_integrity_checks(
    store: &SqliteGraphStore,
) -> result::Result<(), IntegrityError> {
    let report = run_integrity_checks(store).map_err(|err| IntegrityError {
        report: IntegrityReport::default(),
        source: Some(err),
    })?;
    if report.has_issues() {
        Err(IntegrityError {
            report,
            source: None,
        })
    } else {
        Ok(())
    }
}

fn base_report(conn: &Connection) -> Result<IntegrityReport, DagStoreError> {
    Ok(IntegrityReport {
        total_graphs: query_single(conn, "SELECT COUNT(*) FROM graphs")?,
        total_nodes: query_single(conn, "SELECT COUNT(*) FROM nodes")?,
        total_edges: query_single(conn, "SELECT COUNT(*) FROM edges")?,
        ..IntegrityReport::default()
    })
}

fn graph_ids(conn: &Connection) -> Result<Vec<GraphId>, DagStoreError> {
    let mut stmt = conn
        .prepare("SELECT id FROM graphs ORDER BY id")
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, i64>(0))
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    let mut ids = Vec::new();
    for id in rows {
        ids.push(GraphId(id.map_err(|e| DagStoreError::query(e.to_string()))?));
    }
    Ok(ids)
}

fn query_single(conn: &Connection, sql: &str) -> Result<i64, DagStoreError> {
    conn.query_row(sql, [], |row| row.get(0))
        .optional()
        .map(|opt| opt.unwrap_or(0))
        .map_err(|e| DagStoreError::query(e.to_string()))
}
