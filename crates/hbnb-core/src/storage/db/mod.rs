//! DbStorage: the relational engine over SQLite
//!
//! Holds no object cache. Every contract operation goes straight to the
//! session: one pooled connection with an open transaction.
//!
//! - `new` / `delete` run inside the transaction; nothing is durable yet, but
//!   the session's own queries see the change (autoflush).
//! - `save` commits and opens the next transaction.
//! - `reload` creates missing tables, rolls back and returns the old session,
//!   and checks out a fresh one.
//!
//! Foreign keys are deferred to commit; deleting a parent cascades through
//! the schema.

pub mod pool;
mod schema;

pub use pool::{Pool, PooledConnection};

use rusqlite::InterruptHandle;
use std::sync::Arc;

use crate::config::{DbConfig, Environment};
use crate::error::{ResultExt, StorageError, StorageResult};
use crate::models::{Model, ModelKind};

use super::{ObjectMap, Storage};

const ENGINE: &str = "db";

#[derive(Debug)]
struct Session {
    conn: PooledConnection,
}

impl Session {
    fn begin(conn: PooledConnection) -> StorageResult<Self> {
        conn.execute_batch("BEGIN DEFERRED")?;
        Ok(Self { conn })
    }
}

/// Relational engine
#[derive(Debug)]
pub struct DbStorage {
    config: DbConfig,
    pool: Arc<Pool>,
    /// `None` until `reload()`, and again after `close()`
    session: Option<Session>,
}

impl DbStorage {
    /// Build the pool. In the test environment the schema is dropped first.
    /// The engine is Uninitialized until `reload()`.
    pub fn connect(config: DbConfig) -> StorageResult<Self> {
        config.validate()?;
        let pool = Pool::new(&config);
        tracing::info!(
            target_db = %pool.target(),
            environment = %config.environment,
            user = config.user.as_deref().unwrap_or("-"),
            "database storage created"
        );

        let mut storage = Self {
            config,
            pool,
            session: None,
        };
        if storage.config.environment == Environment::Test {
            storage.drop_all()?;
        }
        Ok(storage)
    }

    /// Drop every known table. Refused outside the test environment.
    ///
    /// A live session is closed first and its uncommitted changes are lost;
    /// the engine is Uninitialized afterwards until `reload()`.
    pub fn drop_all(&mut self) -> StorageResult<()> {
        if self.config.environment != Environment::Test {
            return Err(StorageError::UnsafeDrop {
                environment: self.config.environment.to_string(),
            });
        }
        self.close()?;
        let conn = self.pool.checkout()?;
        schema::drop_all(&conn)
            .with_context(|| format!("dropping schema on {}", self.pool.target()))?;
        tracing::info!(target_db = %self.pool.target(), "dropped all tables (test environment)");
        Ok(())
    }

    /// Discard uncommitted changes and start a new transaction.
    pub fn rollback(&mut self) -> StorageResult<()> {
        let session = self.session_mut()?;
        if !session.conn.is_autocommit() {
            session.conn.execute_batch("ROLLBACK")?;
        }
        session.conn.execute_batch("BEGIN DEFERRED")?;
        tracing::debug!("rolled back session");
        Ok(())
    }

    /// Handle that interrupts the statement running on the live session.
    /// The interrupted operation fails with `Cancelled`.
    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.session
            .as_ref()
            .map(|session| session.conn.get_interrupt_handle())
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    fn session(&self) -> StorageResult<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| StorageError::not_initialized(ENGINE))
    }

    fn session_mut(&mut self) -> StorageResult<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| StorageError::not_initialized(ENGINE))
    }
}

impl Storage for DbStorage {
    fn all(&self, kind: Option<ModelKind>) -> StorageResult<ObjectMap> {
        let session = self.session()?;
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => ModelKind::ALL.to_vec(),
        };

        let mut result = ObjectMap::new();
        for kind in kinds {
            for obj in schema::select_all(&session.conn, kind)? {
                result.insert(obj.key(), obj);
            }
        }
        Ok(result)
    }

    fn new(&mut self, obj: &Model) -> StorageResult<()> {
        let session = self.session()?;
        schema::upsert(&session.conn, obj)?;
        tracing::debug!(key = %obj.key(), "staged object");
        Ok(())
    }

    fn save(&mut self) -> StorageResult<()> {
        let session = self.session()?;
        session
            .conn
            .execute_batch("COMMIT")
            .map_err(StorageError::commit)?;
        // Without a fresh transaction later writes would bypass staging
        let restarted = session.conn.execute_batch("BEGIN DEFERRED");
        if let Err(e) = restarted {
            self.session = None;
            tracing::warn!(error = %e, "committed, but no new transaction; session closed");
            return Err(StorageError::from(e).context("reopening transaction after commit"));
        }
        tracing::debug!("committed session");
        Ok(())
    }

    fn delete(&mut self, obj: Option<&Model>) -> StorageResult<()> {
        let session = self.session()?;
        let Some(obj) = obj else {
            return Ok(());
        };
        let removed = schema::delete(&session.conn, obj)?;
        tracing::debug!(key = %obj.key(), removed, "staged delete");
        Ok(())
    }

    fn reload(&mut self) -> StorageResult<()> {
        // The old connection goes back first; an in-memory pool has one slot
        drop(self.session.take());

        let conn = self.pool.checkout()?;
        schema::create_all(&conn).context("creating schema")?;
        self.session = Some(Session::begin(conn)?);
        tracing::info!(target_db = %self.pool.target(), "opened database session");
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if self.session.take().is_some() {
            tracing::debug!("closed database session");
        }
        Ok(())
    }

    fn get(&self, kind: ModelKind, id: &str) -> StorageResult<Option<Model>> {
        schema::select_one(&self.session()?.conn, kind, id)
    }

    fn count(&self, kind: Option<ModelKind>) -> StorageResult<usize> {
        let session = self.session()?;
        match kind {
            Some(kind) => schema::count(&session.conn, kind),
            None => ModelKind::ALL
                .iter()
                .map(|k| schema::count(&session.conn, *k))
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BaseModel, City, State};
    use rusqlite::hooks::{AuthAction, AuthContext, Authorization, TransactionOperation};
    use std::time::Duration;

    fn memory_storage() -> DbStorage {
        let mut storage = DbStorage::connect(DbConfig::in_memory()).unwrap();
        storage.reload().unwrap();
        storage
    }

    fn state(id: &str) -> Model {
        State::with_base(BaseModel::with_id(id), "California").into()
    }

    #[test]
    fn test_operations_before_reload_fail() {
        let mut storage = DbStorage::connect(DbConfig::in_memory()).unwrap();
        let obj = state("S1");

        assert!(storage.all(None).unwrap_err().is_not_initialized());
        assert!(storage.new(&obj).unwrap_err().is_not_initialized());
        assert!(storage.save().unwrap_err().is_not_initialized());
        assert!(storage.delete(None).unwrap_err().is_not_initialized());
        assert!(storage.rollback().unwrap_err().is_not_initialized());
        assert!(storage.interrupt_handle().is_none());
    }

    #[test]
    fn test_pending_changes_visible_to_session() {
        let mut storage = memory_storage();
        storage.new(&state("S1")).unwrap();
        assert!(storage.all(None).unwrap().contains_key("State.S1"));
    }

    #[test]
    fn test_rollback_discards_pending() {
        let mut storage = memory_storage();
        storage.new(&state("S1")).unwrap();
        storage.save().unwrap();
        storage.new(&state("S2")).unwrap();

        storage.rollback().unwrap();
        assert_eq!(storage.count(None).unwrap(), 1);
    }

    #[test]
    fn test_reload_discards_pending() {
        let mut storage = memory_storage();
        storage.new(&state("S1")).unwrap();
        storage.reload().unwrap();
        assert_eq!(storage.count(Some(ModelKind::State)).unwrap(), 0);
    }

    #[test]
    fn test_dangling_foreign_key_fails_at_commit() {
        let mut storage = memory_storage();
        let orphan = City::with_base(BaseModel::with_id("C1"), "nowhere", "Ghost Town");
        storage.new(&orphan.into()).unwrap();

        let err = storage.save().unwrap_err();
        assert!(err.is_commit());

        storage.rollback().unwrap();
        assert_eq!(storage.count(None).unwrap(), 0);
        storage.new(&state("S1")).unwrap();
        storage.save().unwrap();
    }

    #[test]
    fn test_drop_refused_outside_test_env() {
        let mut storage =
            DbStorage::connect(DbConfig::in_memory().with_environment(Environment::Production))
                .unwrap();
        let err = storage.drop_all().unwrap_err();
        assert!(matches!(err, StorageError::UnsafeDrop { .. }));
    }

    #[test]
    fn test_test_env_drops_schema_on_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hbnb_test.db");

        let mut first = DbStorage::connect(DbConfig::at_path(&path)).unwrap();
        first.reload().unwrap();
        first.new(&state("S1")).unwrap();
        first.save().unwrap();
        first.close().unwrap();
        drop(first);

        let mut second =
            DbStorage::connect(DbConfig::at_path(&path).with_environment(Environment::Test))
                .unwrap();
        second.reload().unwrap();
        assert_eq!(second.count(None).unwrap(), 0);
    }

    #[test]
    fn test_drop_all_with_live_in_memory_session() {
        let config = DbConfig::in_memory()
            .with_environment(Environment::Test)
            .with_timeout(Duration::from_millis(200));
        let mut storage = DbStorage::connect(config).unwrap();
        storage.reload().unwrap();
        storage.new(&state("S1")).unwrap();
        storage.save().unwrap();

        storage.drop_all().unwrap();
        assert!(!storage.is_ready());

        storage.reload().unwrap();
        assert_eq!(storage.count(None).unwrap(), 0);
    }

    fn deny_begin(ctx: AuthContext<'_>) -> Authorization {
        match ctx.action {
            AuthAction::Transaction {
                operation: TransactionOperation::Begin,
            } => Authorization::Deny,
            _ => Authorization::Allow,
        }
    }

    #[test]
    fn test_failed_restart_after_commit_closes_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::at_path(dir.path().join("restart.db"));
        let mut storage = DbStorage::connect(config.clone()).unwrap();
        storage.reload().unwrap();
        storage.new(&state("S1")).unwrap();

        if let Some(session) = &storage.session {
            session.conn.authorizer(Some(deny_begin));
        }
        assert!(storage.save().is_err());

        // No autocommit writes slip through afterwards
        assert!(!storage.is_ready());
        assert!(storage.new(&state("S2")).unwrap_err().is_not_initialized());

        // The commit itself went through
        let mut reader = DbStorage::connect(config).unwrap();
        reader.reload().unwrap();
        assert!(reader.get(ModelKind::State, "S1").unwrap().is_some());
        assert!(reader.get(ModelKind::State, "S2").unwrap().is_none());
    }

    #[test]
    fn test_close_returns_to_uninitialized() {
        let mut storage = memory_storage();
        storage.close().unwrap();
        assert!(!storage.is_ready());
        assert!(storage.count(None).unwrap_err().is_not_initialized());
    }

    #[test]
    fn test_second_writer_gives_up_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::at_path(dir.path().join("locks.db"))
            .with_timeout(Duration::from_millis(100));

        let mut writer = DbStorage::connect(config.clone()).unwrap();
        writer.reload().unwrap();
        writer.new(&state("S1")).unwrap();

        let mut other = DbStorage::connect(config).unwrap();
        let started = std::time::Instant::now();
        let result = other.reload().and_then(|_| other.new(&state("S2")));

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
