use std::{path::Path, sync::Arc};

use ahash::AHashMap;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use crate::{
    cache::{CacheStats, SnapshotCache},
    config::{BackendKind, SqliteConfig},
    errors::DagStoreError,
    fault_injection::{self, FaultPoint},
    model::{EdgeSpec, GraphId, GraphSnapshot, NodeDeletion},
    schema::{ensure_schema, ensure_schema_without_migrations},
};

use super::{
    GraphStore, precheck_create,
    pool::{ConnectionPool, PooledConnection},
    transaction::TransactionGuard,
};

/// SQLite-backed [`GraphStore`].
///
/// Graphs, nodes and edges live in relational tables keyed by surrogate
/// rowids; node names are resolved to those ids at the edges of every
/// operation. Writes take the database write lock (`BEGIN IMMEDIATE`), so
/// the node-count check that decides whether a graph disappears runs in the
/// same transaction as the node delete.
///
/// That lock covers the whole database file, not one graph. A long create
/// on one graph holds up writes to every other graph until it commits, and
/// a writer that waits longer than [`SqliteConfig::busy_timeout`] fails with
/// a storage error. Readers are never blocked under WAL. When writes to
/// distinct graphs must proceed independently, use
/// [`MemoryGraphStore`](super::MemoryGraphStore), which locks per graph.
///
/// Fetched snapshots are cached per store and revalidated against the
/// graph's current node count on every hit.
pub struct SqliteGraphStore {
    pool: ConnectionPool,
    cache: Option<SnapshotCache>,
}

impl SqliteGraphStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DagStoreError> {
        Self::with_config(Some(path.as_ref()), &SqliteConfig::default(), true)
    }

    pub fn open_in_memory() -> Result<Self, DagStoreError> {
        Self::with_config(None, &SqliteConfig::default(), true)
    }

    /// Open a store at `path`, or a private in-memory database when `path` is `None`.
    ///
    /// In-memory databases are bound to one connection, so the pool is
    /// clamped to a single connection there.
    #[instrument(skip_all, fields(path = ?path, pool_size = cfg.pool_size))]
    pub fn with_config(
        path: Option<&Path>,
        cfg: &SqliteConfig,
        snapshot_cache: bool,
    ) -> Result<Self, DagStoreError> {
        let pool_size = match path {
            Some(_) => cfg.pool_size.max(1),
            None => 1,
        };
        let mut connections = Vec::with_capacity(pool_size);
        for slot in 0..pool_size {
            let conn = open_connection(path, cfg)?;
            if slot == 0 {
                if cfg.without_migrations {
                    ensure_schema_without_migrations(&conn)?;
                } else {
                    ensure_schema(&conn)?;
                }
            }
            connections.push(conn);
        }
        info!(pool_size, "sqlite graph store opened");
        Ok(Self {
            pool: ConnectionPool::new(connections, cfg.checkout_timeout),
            cache: snapshot_cache.then(|| SnapshotCache::new(cfg.snapshot_cache_capacity)),
        })
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(SnapshotCache::stats)
    }

    pub(crate) fn connection(&self) -> Result<PooledConnection<'_>, DagStoreError> {
        self.pool.get()
    }
}

impl GraphStore for SqliteGraphStore {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    #[instrument(skip_all, fields(nodes = nodes.len(), edges = edges.len()))]
    fn create_atomically(
        &self,
        nodes: &[String],
        edges: &[EdgeSpec],
    ) -> Result<GraphId, DagStoreError> {
        precheck_create(nodes, edges)?;
        let conn = self.pool.get()?;
        let graph_id = TransactionGuard::immediate(&conn)?.run(|conn| {
            conn.execute("INSERT INTO graphs DEFAULT VALUES", [])
                .map_err(|e| DagStoreError::query(e.to_string()))?;
            let graph_id = GraphId(conn.last_insert_rowid());
            let node_ids = insert_nodes(conn, graph_id, nodes)?;
            insert_edges(conn, graph_id, &node_ids, edges)?;
            fault_injection::check_fault(FaultPoint::CreateGraphBeforeCommit)?;
            Ok(graph_id)
        })?;
        debug!(%graph_id, "graph committed");
        Ok(graph_id)
    }

    #[instrument(skip(self))]
    fn fetch(&self, graph_id: GraphId) -> Result<Arc<GraphSnapshot>, DagStoreError> {
        let conn = self.pool.get()?;
        let Some(cache) = &self.cache else {
            let snapshot =
                TransactionGuard::deferred(&conn)?.run(|conn| load_snapshot(conn, graph_id))?;
            return Ok(Arc::new(snapshot));
        };
        // The hit check and the reload share one read transaction, so a
        // delete committed by any connection is either fully seen or not at all.
        let result = TransactionGuard::deferred(&conn)?.run(|conn| {
            let node_count = graph_node_count(conn, graph_id)?;
            if let Some(hit) = cache.get(graph_id, node_count) {
                return Ok(hit);
            }
            let snapshot = Arc::new(load_snapshot(conn, graph_id)?);
            cache.insert(graph_id, Arc::clone(&snapshot));
            Ok(snapshot)
        });
        if matches!(result, Err(DagStoreError::NotFound(_))) {
            cache.invalidate(graph_id);
        }
        result
    }

    #[instrument(skip(self))]
    fn delete_node(&self, graph_id: GraphId, node: &str) -> Result<NodeDeletion, DagStoreError> {
        let conn = self.pool.get()?;
        let outcome = TransactionGuard::immediate(&conn)?.run(|conn| {
            let node_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM nodes WHERE graph_id=?1 AND name=?2",
                    params![graph_id.0, node],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| DagStoreError::query(e.to_string()))?;
            let Some(node_id) = node_id else {
                return Err(DagStoreError::not_found(format!(
                    "node {node} in graph {graph_id}"
                )));
            };
            let removed_edges = conn
                .execute(
                    "DELETE FROM edges WHERE graph_id=?1 AND (source_id=?2 OR target_id=?2)",
                    params![graph_id.0, node_id],
                )
                .map_err(|e| DagStoreError::query(e.to_string()))?;
            conn.execute("DELETE FROM nodes WHERE id=?1", params![node_id])
                .map_err(|e| DagStoreError::query(e.to_string()))?;
            let graph_removed = if graph_has_nodes(conn, graph_id)? {
                false
            } else {
                conn.execute("DELETE FROM graphs WHERE id=?1", params![graph_id.0])
                    .map_err(|e| DagStoreError::query(e.to_string()))?;
                true
            };
            fault_injection::check_fault(FaultPoint::DeleteNodeBeforeCommit)?;
            Ok(NodeDeletion {
                removed_edges,
                graph_removed,
            })
        })?;
        if let Some(cache) = &self.cache {
            cache.invalidate(graph_id);
        }
        debug!(
            removed_edges = outcome.removed_edges,
            graph_removed = outcome.graph_removed,
            "node deleted"
        );
        Ok(outcome)
    }

    fn exists_any_node(&self, graph_id: GraphId) -> Result<bool, DagStoreError> {
        let conn = self.pool.get()?;
        graph_has_nodes(&conn, graph_id)
    }

    fn graph_count(&self) -> Result<usize, DagStoreError> {
        let conn = self.pool.get()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM graphs", [], |row| row.get(0))
            .map_err(|e| DagStoreError::query(e.to_string()))?;
        Ok(count as usize)
    }
}

fn open_connection(path: Option<&Path>, cfg: &SqliteConfig) -> Result<Connection, DagStoreError> {
    let conn = match path {
        Some(path) => Connection::open(path),
        None => Connection::open_in_memory(),
    }
    .map_err(|e| DagStoreError::connection(e.to_string()))?;
    conn.set_prepared_statement_cache_capacity(64);
    conn.busy_timeout(cfg.busy_timeout)
        .map_err(|e| DagStoreError::connection(e.to_string()))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| DagStoreError::connection(e.to_string()))?;

    if path.is_some() {
        // WAL lets readers keep their snapshot while a writer commits.
        if conn.pragma_update(None, "journal_mode", "WAL").is_err() {
            let _ = conn.pragma_update(None, "journal_mode", "DELETE");
        }
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    }

    for (key, value) in &cfg.pragma_settings {
        let pragma_sql = format!("PRAGMA {key} = {value}");
        match conn.execute(&pragma_sql, []) {
            Ok(_) | Err(rusqlite::Error::ExecuteReturnedResults) => {}
            Err(e) => {
                return Err(DagStoreError::connection(format!(
                    "PRAGMA {key} = {value}: {e}"
                )));
            }
        }
    }
    Ok(conn)
}

fn insert_nodes<'n>(
    conn: &Connection,
    graph_id: GraphId,
    nodes: &'n [String],
) -> Result<AHashMap<&'n str, i64>, DagStoreError> {
    let mut stmt = conn
        .prepare_cached("INSERT INTO nodes(graph_id, name) VALUES(?1, ?2)")
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    let mut ids = AHashMap::with_capacity(nodes.len());
    for name in nodes {
        stmt.execute(params![graph_id.0, name]).map_err(|e| {
            if is_unique_violation(&e) {
                DagStoreError::duplicate_node(name.as_str())
            } else {
                DagStoreError::query(e.to_string())
            }
        })?;
        ids.insert(name.as_str(), conn.last_insert_rowid());
    }
    Ok(ids)
}

fn insert_edges(
    conn: &Connection,
    graph_id: GraphId,
    node_ids: &AHashMap<&str, i64>,
    edges: &[EdgeSpec],
) -> Result<(), DagStoreError> {
    let mut stmt = conn
        .prepare_cached("INSERT INTO edges(graph_id, source_id, target_id) VALUES(?1, ?2, ?3)")
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    for edge in edges {
        let source_id = resolve_node(node_ids, &edge.source)?;
        let target_id = resolve_node(node_ids, &edge.target)?;
        stmt.execute(params![graph_id.0, source_id, target_id])
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DagStoreError::duplicate_edge(edge)
                } else {
                    DagStoreError::query(e.to_string())
                }
            })?;
    }
    Ok(())
}

fn resolve_node(node_ids: &AHashMap<&str, i64>, name: &str) -> Result<i64, DagStoreError> {
    node_ids.get(name).copied().ok_or_else(|| {
        DagStoreError::integrity(format!("edge endpoint {name} is not a node of the new graph"))
    })
}

pub(crate) fn load_snapshot(
    conn: &Connection,
    graph_id: GraphId,
) -> Result<GraphSnapshot, DagStoreError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM graphs WHERE id=?1",
            params![graph_id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    if exists.is_none() {
        return Err(DagStoreError::not_found(format!("graph {graph_id}")));
    }

    let mut stmt = conn
        .prepare_cached("SELECT name FROM nodes WHERE graph_id=?1 ORDER BY id")
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    let rows = stmt
        .query_map(params![graph_id.0], |row| row.get::<_, String>(0))
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    let mut nodes = Vec::new();
    for name in rows {
        nodes.push(name.map_err(|e| DagStoreError::query(e.to_string()))?);
    }

    let mut stmt = conn
        .prepare_cached(
            "SELECT src.name, dst.name FROM edges e \
             JOIN nodes src ON src.id = e.source_id \
             JOIN nodes dst ON dst.id = e.target_id \
             WHERE e.graph_id=?1 ORDER BY e.id",
        )
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    let rows = stmt
        .query_map(params![graph_id.0], |row| {
            Ok(EdgeSpec {
                source: row.get(0)?,
                target: row.get(1)?,
            })
        })
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    let mut edges = Vec::new();
    for edge in rows {
        edges.push(edge.map_err(|e| DagStoreError::query(e.to_string()))?);
    }

    Ok(GraphSnapshot {
        id: graph_id,
        nodes,
        edges,
    })
}

fn graph_node_count(conn: &Connection, graph_id: GraphId) -> Result<usize, DagStoreError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM nodes WHERE graph_id=?1",
            params![graph_id.0],
            |row| row.get(0),
        )
        .map_err(|e| DagStoreError::query(e.to_string()))?;
    Ok(count as usize)
}

pub(crate) fn graph_has_nodes(conn: &Connection, graph_id: GraphId) -> Result<bool, DagStoreError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE graph_id=?1)",
        params![graph_id.0],
        |row| row.get(0),
    )
    .map_err(|e| DagStoreError::query(e.to_string()))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
