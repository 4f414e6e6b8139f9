//! HBNB Core - storage engines for the HBNB domain objects
//!
//! Users, places, states, cities, amenities and reviews are persisted through
//! one contract, [`storage::Storage`], backed by one of two interchangeable
//! engines chosen once at startup:
//!
//! 1. **File engine** (`FileStorage`): every object lives in an in-memory
//!    table, snapshotted to a JSON file on `save()`.
//! 2. **Relational engine** (`DbStorage`): every operation goes to a SQLite
//!    session drawn from a pre-pinging connection pool.
//!
//! # Quick Start
//!
//! ```
//! use hbnb_core::models::{BaseModel, City, Model, ModelKind, State};
//! use hbnb_core::storage::{FileStorage, Storage};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut storage = FileStorage::open(dir.path().join("file.json"));
//! storage.reload().unwrap();
//!
//! let california = Model::from(State::with_base(BaseModel::with_id("S1"), "California"));
//! let sf = Model::from(City::with_base(BaseModel::with_id("C1"), "S1", "SF"));
//! storage.new(&california).unwrap();
//! storage.new(&sf).unwrap();
//! storage.save().unwrap();
//!
//! let cities = storage.all(Some(ModelKind::City)).unwrap();
//! assert_eq!(cities.get("City.C1"), Some(&sf));
//! ```
//!
//! # Lifecycle
//!
//! Engines start Uninitialized; `reload()` makes them Ready. Any other
//! operation before that fails with [`StorageError::NotInitialized`].

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{CascadePolicy, DbConfig, Environment, FileConfig, StorageConfig, StorageKind};
pub use error::{StorageError, StorageResult};
pub use models::{Model, ModelKind};
pub use storage::{open_storage, DbStorage, FileStorage, ObjectMap, Storage};
pub use types::Timestamp;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
