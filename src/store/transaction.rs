use rusqlite::Connection;

use crate::errors::DagStoreError;

/// Transaction scope with automatic rollback on drop.
///
/// Anything that leaves the scope without [`TransactionGuard::commit`],
/// including an error, a panic or a cancelled caller, rolls back.
pub struct TransactionGuard<'c> {
    conn: &'c Connection,
    committed: bool,
}

impl<'c> TransactionGuard<'c> {
    /// Start a write transaction, taking the database write lock up front.
    pub fn immediate(conn: &'c Connection) -> Result<Self, DagStoreError> {
        Self::begin(conn, "BEGIN IMMEDIATE")
    }

    /// Start a read transaction; every statement inside sees the same snapshot.
    pub fn deferred(conn: &'c Connection) -> Result<Self, DagStoreError> {
        Self::begin(conn, "BEGIN DEFERRED")
    }

    fn begin(conn: &'c Connection, sql: &str) -> Result<Self, DagStoreError> {
        conn.execute_batch(sql)
            .map_err(|e| DagStoreError::transaction(e.to_string()))?;
        Ok(Self {
            conn,
            committed: false,
        })
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn commit(mut self) -> Result<(), DagStoreError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| DagStoreError::transaction(e.to_string()))?;
        self.committed = true;
        Ok(())
    }

    /// Run `f` inside the transaction, committing only if it succeeds.
    pub fn run<F, R>(self, f: F) -> Result<R, DagStoreError>
    where
        F: FnOnce(&'c Connection) -> Result<R, DagStoreError>,
    {
        let result = f(self.conn)?;
        self.commit()?;
        Ok(result)
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
