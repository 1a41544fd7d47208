use std::{
    ops::Deref,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};
use rusqlite::Connection;
use tracing::warn;

use crate::errors::DagStoreError;

/// Fixed-size set of SQLite connections shared between worker threads.
///
/// A checkout blocks until a connection is idle or the checkout timeout
/// elapses. Connections go back to the pool when the guard drops.
pub struct ConnectionPool {
    slots: Vec<Mutex<Connection>>,
    idle: Mutex<Vec<usize>>,
    available: Condvar,
    checkout_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(connections: Vec<Connection>, checkout_timeout: Duration) -> Self {
        Self {
            idle: Mutex::new((0..connections.len()).collect()),
            slots: connections.into_iter().map(Mutex::new).collect(),
            available: Condvar::new(),
            checkout_timeout,
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn get(&self) -> Result<PooledConnection<'_>, DagStoreError> {
        let deadline = Instant::now() + self.checkout_timeout;
        let mut idle = self.idle.lock();
        loop {
            if let Some(slot) = idle.pop() {
                drop(idle);
                return Ok(PooledConnection {
                    pool: self,
                    slot,
                    conn: self.slots[slot].lock(),
                });
            }
            if self.available.wait_until(&mut idle, deadline).timed_out() && idle.is_empty() {
                warn!(
                    pool_size = self.size(),
                    "no sqlite connection became idle before the checkout timeout"
                );
                return Err(DagStoreError::pool_timeout(format!(
                    "all {} connections busy for {:?}",
                    self.size(),
                    self.checkout_timeout
                )));
            }
        }
    }

    fn release(&self, slot: usize) {
        self.idle.lock().push(slot);
        self.available.notify_one();
    }
}

/// Exclusive use of one pooled connection.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    slot: usize,
    conn: MutexGuard<'a, Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}
