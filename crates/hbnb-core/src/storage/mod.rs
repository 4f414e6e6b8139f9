//! Storage engines behind one contract
//!
//! Application code talks to [`Storage`] only. Two engines implement it:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     dyn Storage                          │
//! │     all · new · save · delete · reload (+ get, count)    │
//! ├────────────────────────────┬─────────────────────────────┤
//! │  FileStorage               │  DbStorage                  │
//! │  in-memory table           │  pooled SQLite session      │
//! │  ↕ whole-file JSON snapshot│  ↕ one transaction per save │
//! └────────────────────────────┴─────────────────────────────┘
//! ```
//!
//! Both start Uninitialized. `reload()` moves them to Ready; every other
//! operation before that fails with `NotInitialized`.
//!
//! # Example
//!
//! ```no_run
//! use hbnb_core::config::StorageConfig;
//! use hbnb_core::models::{Model, State};
//! use hbnb_core::storage::open_storage;
//!
//! # fn example() -> hbnb_core::StorageResult<()> {
//! let mut storage = open_storage(&StorageConfig::from_env()?)?;
//! let state = Model::from(State::new("California"));
//! storage.new(&state)?;
//! storage.save()?;
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod file_storage;

pub use db::DbStorage;
pub use file_storage::FileStorage;

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{StorageConfig, StorageKind};
use crate::error::{StorageError, StorageResult};
use crate::models::{relations, Model, ModelKind};

/// Query result: registry key → object
pub type ObjectMap = BTreeMap<String, Model>;

/// The storage contract shared by every engine
pub trait Storage: Send + fmt::Debug {
    /// Every live object, or only those of `kind`
    fn all(&self, kind: Option<ModelKind>) -> StorageResult<ObjectMap>;

    /// Register `obj` for persistence on the next `save()`
    fn new(&mut self, obj: &Model) -> StorageResult<()>;

    /// Durably commit everything pending, all or nothing
    fn save(&mut self) -> StorageResult<()>;

    /// Mark `obj` for removal; `None` is a no-op
    fn delete(&mut self, obj: Option<&Model>) -> StorageResult<()>;

    /// (Re)initialize from durable storage, discarding uncommitted state
    fn reload(&mut self) -> StorageResult<()>;

    /// Release the live session
    fn close(&mut self) -> StorageResult<()>;

    /// Single object by kind and id
    fn get(&self, kind: ModelKind, id: &str) -> StorageResult<Option<Model>> {
        Ok(self.all(Some(kind))?.remove(&kind.key(id)))
    }

    /// Number of live objects, optionally of one kind
    fn count(&self, kind: Option<ModelKind>) -> StorageResult<usize> {
        Ok(self.all(kind)?.len())
    }

    /// Objects of `child` that belong to `parent` along a declared relation,
    /// e.g. the cities of a state. For a place and `Amenity`, its linked
    /// amenities.
    fn related(&self, parent: &Model, child: ModelKind) -> StorageResult<Vec<Model>> {
        if let Some(relation) = relations::find(parent.kind(), child) {
            let children = self.all(Some(child))?;
            return Ok(children
                .into_values()
                .filter(|m| m.foreign_key(relation.foreign_key) == Some(parent.id()))
                .collect());
        }

        match parent {
            Model::Place(place) if child == relations::PLACE_AMENITY.target => {
                let amenities = self.all(Some(child))?;
                Ok(place
                    .amenity_ids
                    .iter()
                    .filter_map(|id| amenities.get(&child.key(id)).cloned())
                    .collect())
            }
            _ => Err(StorageError::NoRelation {
                parent: parent.kind(),
                child,
            }),
        }
    }
}

/// Construct the engine selected by `config` and reload it.
pub fn open_storage(config: &StorageConfig) -> StorageResult<Box<dyn Storage>> {
    let mut storage: Box<dyn Storage> = match config.kind {
        StorageKind::File => Box::new(FileStorage::with_config(&config.file)),
        StorageKind::Db => Box::new(DbStorage::connect(config.db.clone())?),
    };
    storage.reload()?;
    tracing::info!(kind = ?config.kind, "storage ready");
    Ok(storage)
}
