//! A small hand-rolled connection pool.
//!
//! The indexer's `ExecutionLog` (`src/graph/execution_log.rs`) opens a fresh
//! `rusqlite::Connection` per call against a bare `db_path: PathBuf`. This
//! crate needs one pool shared by the watcher, the HTTP handlers, and the
//! scheduler concurrently, so the ad hoc-connection idiom is generalized
//! into a small bounded pool -- no pooling crate appears anywhere in the
//! retrieved corpus, so this is built rather than imported.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use rusqlite::Connection;

use crate::error::ObbyResult;

struct Inner {
    idle: Mutex<Vec<Connection>>,
    available: Condvar,
    db_path: PathBuf,
    max_size: usize,
    outstanding: Mutex<usize>,
}

#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Inner>,
}

impl ConnectionPool {
    pub fn open(db_path: &Path, max_size: usize) -> ObbyResult<Self> {
        let conn = open_connection(db_path)?;
        let inner = Inner {
            idle: Mutex::new(vec![conn]),
            available: Condvar::new(),
            db_path: db_path.to_path_buf(),
            max_size: max_size.max(1),
            outstanding: Mutex::new(1),
        };
        Ok(ConnectionPool { inner: Arc::new(inner) })
    }

    /// Checks out a connection, blocking the calling (blocking-pool) thread
    /// if every connection is in use and the pool is already at capacity.
    pub fn checkout(&self) -> ObbyResult<PooledConnection> {
        let mut idle = self.inner.idle.lock().unwrap();
        loop {
            if let Some(conn) = idle.pop() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: self.clone(),
                });
            }
            let mut outstanding = self.inner.outstanding.lock().unwrap();
            if *outstanding < self.inner.max_size {
                *outstanding += 1;
                drop(outstanding);
                let conn = open_connection(&self.inner.db_path)?;
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: self.clone(),
                });
            }
            drop(outstanding);
            idle = self.inner.available.wait(idle).unwrap();
        }
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.inner.idle.lock().unwrap();
        idle.push(conn);
        self.inner.available.notify_one();
    }
}

fn open_connection(db_path: &Path) -> ObbyResult<Connection> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

pub struct PooledConnection {
    conn: Option<Connection>,
    pool: ConnectionPool,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn checkout_and_release_cycle_reuses_connections() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("test.db"), 2).unwrap();
        {
            let conn = pool.checkout().unwrap();
            conn.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        }
        let conn2 = pool.checkout().unwrap();
        conn2
            .execute("INSERT INTO t (id) VALUES (1)", [])
            .unwrap();
    }

    #[test]
    fn pool_grows_up_to_max_size() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("test.db"), 3).unwrap();
        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        let c = pool.checkout().unwrap();
        drop(a);
        drop(b);
        drop(c);
    }
}
