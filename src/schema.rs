use rusqlite::Connection;

use crate::{errors::DagStoreError, store::transaction::TransactionGuard};

pub const BASE_SCHEMA_VERSION: i64 = 1;

struct MigrationStep {
    target_version: i64,
    statements: &'static [&'static str],
}

const MIGRATION_STEPS: &[MigrationStep] = &[MigrationStep {
    target_version: 2,
    statements: &[
        "CREATE INDEX IF NOT EXISTS idx_edges_graph_target ON edges(graph_id, target_id)",
        "CREATE INDEX IF NOT EXISTS idx_nodes_graph ON nodes(graph_id, id)",
    ],
}];

pub const SCHEMA_VERSION: i64 = BASE_SCHEMA_VERSION + MIGRATION_STEPS.len() as i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    pub statements: Vec<&'static str>,
    pub dry_run: bool,
}

/// Create or upgrade the schema.
///
/// Every step runs under the database write lock, so processes opening the
/// same fresh file at once serialize instead of racing on table creation.
pub fn ensure_schema(conn: &Connection) -> Result<(), DagStoreError> {
    ensure_schema_without_migrations(conn)?;
    run_pending_migrations(conn, false)?;
    Ok(())
}

pub fn ensure_schema_without_migrations(conn: &Connection) -> Result<(), DagStoreError> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| DagStoreError::schema(e.to_string()))?;
    TransactionGuard::immediate(conn)?.run(|conn| {
        ensure_base_schema(conn)?;
        ensure_meta(conn)
    })
}

// No ON DELETE CASCADE: node deletion removes incident edges and the
// emptied graph itself, inside one transaction.
fn ensure_base_schema(conn: &Connection) -> Result<(), DagStoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS graphs (
            id        INTEGER PRIMARY KEY AUTOINCREMENT
        );
        CREATE TABLE IF NOT EXISTS nodes (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            graph_id  INTEGER NOT NULL REFERENCES graphs(id),
            name      TEXT NOT NULL CHECK (length(name) BETWEEN 1 AND 255),
            UNIQUE (graph_id, name)
        );
        CREATE TABLE IF NOT EXISTS edges (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            graph_id  INTEGER NOT NULL REFERENCES graphs(id),
            source_id INTEGER NOT NULL REFERENCES nodes(id),
            target_id INTEGER NOT NULL REFERENCES nodes(id),
            UNIQUE (graph_id, source_id, target_id)
        );
        CREATE TABLE IF NOT EXISTS graph_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL
        );
        "#,
    )
    .map_err(|e| DagStoreError::schema(e.to_string()))
}

pub fn read_schema_version(conn: &Connection) -> Result<i64, DagStoreError> {
    conn.query_row(
        "SELECT schema_version FROM graph_meta WHERE id=1",
        [],
        |row| row.get(0),
    )
    .map_err(|e| DagStoreError::schema(e.to_string()))
}

/// Apply (or with `dry_run`, only list) the migration steps newer than the
/// stored version. The version is re-read under the write lock, so a step
/// another process already applied is skipped.
pub fn run_pending_migrations(
    conn: &Connection,
    dry_run: bool,
) -> Result<MigrationReport, DagStoreError> {
    if dry_run {
        return pending_migrations(conn, true);
    }
    TransactionGuard::immediate(conn)?.run(|conn| {
        let report = pending_migrations(conn, false)?;
        if report.statements.is_empty() {
            return Ok(report);
        }
        for sql in report.statements.iter().copied() {
            conn.execute(sql, [])
                .map_err(|e| DagStoreError::schema(e.to_string()))?;
        }
        conn.execute(
            "UPDATE graph_meta SET schema_version=?1 WHERE id=1",
            [report.to_version],
        )
        .map_err(|e| DagStoreError::schema(e.to_string()))?;
        Ok(report)
    })
}

fn pending_migrations(conn: &Connection, dry_run: bool) -> Result<MigrationReport, DagStoreError> {
    let current = read_schema_version(conn)?;
    let mut statements: Vec<&'static str> = Vec::new();
    let mut target = current;
    for step in MIGRATION_STEPS {
        if step.target_version > current {
            target = step.target_version;
            statements.extend_from_slice(step.statements);
        }
    }
    Ok(MigrationReport {
        from_version: current,
        to_version: target,
        statements,
        dry_run,
    })
}

fn ensure_meta(conn: &Connection) -> Result<(), DagStoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO graph_meta(id, schema_version) VALUES(1, ?1)",
        [BASE_SCHEMA_VERSION],
    )
    .map_err(|e| DagStoreError::schema(e.to_string()))?;
    let existing = read_schema_version(conn)?;
    if existing > SCHEMA_VERSION {
        return Err(DagStoreError::schema(format!(
            "database schema version {existing} is newer than supported {SCHEMA_VERSION}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn dry_run_reports_pending_steps_without_applying() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema_without_migrations(&conn).unwrap();
        let report = run_pending_migrations(&conn, true).unwrap();
        assert_eq!(report.from_version, BASE_SCHEMA_VERSION);
        assert_eq!(report.to_version, SCHEMA_VERSION);
        assert!(!report.statements.is_empty());
        assert_eq!(read_schema_version(&conn).unwrap(), BASE_SCHEMA_VERSION);

        run_pending_migrations(&conn, false).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute(
            "UPDATE graph_meta SET schema_version=?1 WHERE id=1",
            [SCHEMA_VERSION + 1],
        )
        .unwrap();
        let err = ensure_schema(&conn).unwrap_err();
        assert!(matches!(err, DagStoreError::SchemaError(_)));
        assert!(conn.is_autocommit());
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        let report = run_pending_migrations(&conn, false).unwrap();
        assert!(report.statements.is_empty());
        assert_eq!(report.from_version, SCHEMA_VERSION);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM graph_meta", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn schema_creation_waits_for_writer_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.db");
        let holder = Connection::open(&path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.busy_timeout(std::time::Duration::from_millis(20))
            .unwrap();
        assert!(ensure_schema(&conn).is_err());
        holder.execute_batch("ROLLBACK").unwrap();

        ensure_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
