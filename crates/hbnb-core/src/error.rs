//! Error types for HBNB storage
//!
//! Every storage engine reports failures through [`StorageError`]. Nothing is
//! swallowed: each variant reaches the immediate caller, which owns any retry
//! policy.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::ModelKind;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Main error type for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// A contract operation ran before the first successful `reload()`
    #[error("{engine} storage used before reload()")]
    NotInitialized { engine: &'static str },

    /// A type name outside the model catalog
    #[error("unknown model type: {0}")]
    UnknownType(String),

    /// No relation is declared between the two kinds
    #[error("no relation declared from {parent} to {child}")]
    NoRelation { parent: ModelKind, child: ModelKind },

    /// The backend could not be reached, even after replacing the connection
    #[error("connection to {target} failed: {source}")]
    Connection {
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    /// No pooled connection became available in time
    #[error("timed out after {waited_ms}ms waiting for a database connection")]
    PoolTimeout { waited_ms: u64 },

    /// `save()` could not durably apply the pending batch
    #[error("commit failed: {0}")]
    Commit(#[source] Box<StorageError>),

    /// SQL error outside the commit boundary
    #[error("query error: {0}")]
    Query(#[source] rusqlite::Error),

    /// An in-flight statement was interrupted
    #[error("operation cancelled")]
    Cancelled,

    /// A stored record could not be turned back into a model
    #[error("invalid record {key}: {reason}")]
    InvalidRecord { key: String, reason: String },

    /// IO error on the backing file
    #[error("I/O error at {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be parsed or is inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Schema drop requested outside the test environment
    #[error("refusing to drop schema in {environment} environment")]
    UnsafeDrop { environment: String },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Create a not-initialized error for the named engine.
    pub fn not_initialized(engine: &'static str) -> Self {
        Self::NotInitialized { engine }
    }

    /// Create a file I/O error with path context.
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Create a connection error for the given target.
    pub fn connection(target: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Connection {
            target: target.into(),
            source,
        }
    }

    /// Wrap an error raised while committing.
    pub fn commit(inner: impl Into<StorageError>) -> Self {
        Self::Commit(Box::new(inner.into()))
    }

    /// Create an invalid-record error.
    pub fn invalid_record(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip context wrappers and return the underlying error.
    pub fn root(&self) -> &StorageError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the error is (or wraps) a `NotInitialized`.
    pub fn is_not_initialized(&self) -> bool {
        matches!(self.root(), Self::NotInitialized { .. })
    }

    /// True when the error is (or wraps) a commit failure.
    pub fn is_commit(&self) -> bool {
        matches!(self.root(), Self::Commit(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                StorageError::Cancelled
            }
            other => StorageError::Query(other),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> StorageResult<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> StorageResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for StorageResult<T> {
    fn context(self, context: impl Into<String>) -> StorageResult<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> StorageResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = StorageError::not_initialized("file").context("Failed to list objects");

        assert!(err.to_string().contains("Failed to list objects"));
        assert!(err.is_not_initialized());
    }

    #[test]
    fn test_result_ext() {
        let result: StorageResult<()> = Err(StorageError::UnknownType("Spaceship".into()));
        let result = result.with_context(|| "parsing filter".to_string());

        let err = result.unwrap_err();
        assert!(err.to_string().contains("parsing filter"));
        assert!(matches!(err.root(), StorageError::UnknownType(name) if name == "Spaceship"));
    }

    #[test]
    fn test_interrupt_maps_to_cancelled() {
        let sqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
            None,
        );
        assert!(matches!(StorageError::from(sqlite_err), StorageError::Cancelled));
    }

    #[test]
    fn test_commit_wraps_inner() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = StorageError::commit(StorageError::file_io("/tmp/file.json", io));

        assert!(err.is_commit());
        assert!(err.to_string().contains("read-only"));
    }
}
