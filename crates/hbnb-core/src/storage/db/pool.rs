//! Connection pool with pre-ping
//!
//! Every checkout validates the connection with `SELECT 1`. A connection that
//! fails the ping is dropped and replaced by a fresh one before the caller
//! sees it; only a failure to open the replacement reaches the caller.
//! Waiting for a free connection is bounded by the configured timeout.

use parking_lot::{Condvar, Mutex};
use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{DbConfig, DbTarget};
use crate::error::{StorageError, StorageResult};

struct PoolState {
    idle: Vec<Connection>,
    /// Connections alive, idle or checked out
    open: usize,
}

/// Bounded pool of SQLite connections
pub struct Pool {
    target: DbTarget,
    max_size: usize,
    timeout: Duration,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Pool")
            .field("target", &self.target)
            .field("max_size", &self.max_size)
            .field("open", &state.open)
            .field("idle", &state.idle.len())
            .finish()
    }
}

impl Pool {
    pub fn new(config: &DbConfig) -> Arc<Self> {
        Arc::new(Self {
            target: config.target(),
            max_size: config.effective_pool_size(),
            timeout: config.timeout(),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                open: 0,
            }),
            available: Condvar::new(),
        })
    }

    pub fn target(&self) -> &DbTarget {
        &self.target
    }

    /// Connections currently alive
    pub fn open_count(&self) -> usize {
        self.state.lock().open
    }

    /// Connections waiting in the pool
    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Hand out a validated connection, waiting at most the pool timeout.
    pub fn checkout(self: &Arc<Self>) -> StorageResult<PooledConnection> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.state.lock();

        loop {
            if let Some(conn) = state.idle.pop() {
                drop(state);
                return self.validate(conn);
            }

            if state.open < self.max_size {
                state.open += 1;
                drop(state);
                return match self.connect() {
                    Ok(conn) => Ok(self.wrap(conn)),
                    Err(e) => {
                        self.release_slot();
                        Err(e)
                    }
                };
            }

            if self.available.wait_until(&mut state, deadline).timed_out() {
                return Err(StorageError::PoolTimeout {
                    waited_ms: self.timeout.as_millis() as u64,
                });
            }
        }
    }

    fn validate(self: &Arc<Self>, conn: Connection) -> StorageResult<PooledConnection> {
        match ping(&conn) {
            Ok(()) => Ok(self.wrap(conn)),
            Err(e) => {
                tracing::warn!(target_db = %self.target, error = %e, "stale connection, replacing");
                drop(conn);
                match self.connect() {
                    Ok(fresh) => Ok(self.wrap(fresh)),
                    Err(e) => {
                        self.release_slot();
                        Err(e)
                    }
                }
            }
        }
    }

    fn connect(&self) -> StorageResult<Connection> {
        let conn = match &self.target {
            DbTarget::Memory => Connection::open_in_memory(),
            DbTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::file_io(parent, e))?;
                }
                Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX
                        | OpenFlags::SQLITE_OPEN_URI,
                )
            }
        }
        .map_err(|e| StorageError::connection(self.target.to_string(), e))?;

        conn.busy_timeout(self.timeout)
            .map_err(|e| StorageError::connection(self.target.to_string(), e))?;

        let pragmas = match self.target {
            DbTarget::Memory => "PRAGMA foreign_keys = ON;",
            DbTarget::File(_) => {
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;"
            }
        };
        conn.execute_batch(pragmas)
            .map_err(|e| StorageError::connection(self.target.to_string(), e))?;

        tracing::debug!(target_db = %self.target, "opened database connection");
        Ok(conn)
    }

    fn wrap(self: &Arc<Self>, conn: Connection) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
        }
    }

    fn checkin(&self, conn: Connection) {
        self.state.lock().idle.push(conn);
        self.available.notify_one();
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.open = state.open.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }
}

fn ping(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
}

/// A checked-out connection; returns to the pool on drop.
///
/// An open transaction is rolled back before the connection goes back. If the
/// rollback fails the connection is discarded instead.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<Pool>,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("target", &self.pool.target)
            .finish()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback on checkin failed, discarding connection");
                drop(conn);
                self.pool.release_slot();
                return;
            }
        }
        self.pool.checkin(conn);
    }
}
