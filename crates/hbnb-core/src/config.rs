//! Storage configuration
//!
//! Built once at startup, from the environment or a TOML file, and handed to
//! [`crate::storage::open_storage`]. Nothing reads the environment after that.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{StorageError, StorageResult};

/// Default backing file of the file engine
pub const DEFAULT_FILE_PATH: &str = "file.json";

/// Default bound on pool checkout and SQLite lock waits
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default number of pooled connections
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Which engine backs the storage handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Db,
}

impl FromStr for StorageKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "db" => Ok(StorageKind::Db),
            "file" | "" => Ok(StorageKind::File),
            other => Err(StorageError::InvalidConfig(format!(
                "unknown storage type '{}'",
                other
            ))),
        }
    }
}

/// Deployment environment; only `Test` permits dropping the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Test,
    #[default]
    Dev,
    Production,
}

impl Environment {
    /// Lenient parse: anything unrecognized is `Dev`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Environment::Test,
            "production" | "prod" => Environment::Production,
            _ => Environment::Dev,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Test => "test",
            Environment::Dev => "dev",
            Environment::Production => "production",
        };
        f.write_str(s)
    }
}

/// Whether the file engine reproduces the relational cascade on delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadePolicy {
    /// Dependents stay in place (orphaned) when a parent is deleted
    #[default]
    None,
    /// Dependents are deleted along the declared relations
    Cascade,
}

/// File engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub path: PathBuf,
    pub cascade: CascadePolicy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_FILE_PATH),
            cascade: CascadePolicy::None,
        }
    }
}

/// Where the relational engine's database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    Memory,
    File(PathBuf),
}

impl fmt::Display for DbTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbTarget::Memory => f.write_str(":memory:"),
            DbTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Relational engine settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Accepted for parity with server databases; SQLite does not authenticate
    pub user: Option<String>,
    pub password: Option<String>,
    /// Directory holding the database file; `localhost` means the working dir
    pub host: Option<String>,
    /// Database name, or `:memory:`
    pub name: String,
    pub environment: Environment,
    pub timeout_ms: u64,
    pub pool_size: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            host: None,
            name: "hbnb".to_string(),
            environment: Environment::Dev,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("name", &self.name)
            .field("environment", &self.environment)
            .field("timeout_ms", &self.timeout_ms)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl DbConfig {
    /// In-memory database, mostly for tests
    pub fn in_memory() -> Self {
        Self {
            name: ":memory:".to_string(),
            ..Self::default()
        }
    }

    /// Database file at `path`
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let host = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.display().to_string());
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hbnb".to_string());
        Self {
            host,
            name,
            ..Self::default()
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve host + name to a database location
    pub fn target(&self) -> DbTarget {
        if self.name == ":memory:" {
            return DbTarget::Memory;
        }
        let file = format!("{}.db", self.name);
        match self.host.as_deref() {
            None | Some("") | Some("localhost") => DbTarget::File(PathBuf::from(file)),
            Some(dir) => DbTarget::File(Path::new(dir).join(file)),
        }
    }

    /// Pool size actually used; an in-memory database lives inside a single
    /// connection, so it is pinned to one.
    pub fn effective_pool_size(&self) -> usize {
        match self.target() {
            DbTarget::Memory => 1,
            DbTarget::File(_) => self.pool_size.max(1),
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.name.trim().is_empty() {
            return Err(StorageError::InvalidConfig("database name is empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(StorageError::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Top-level storage configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub file: FileConfig,
    pub db: DbConfig,
}

impl StorageConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `HBNB_*` variables from the process environment
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(kind) = lookup("HBNB_TYPE_STORAGE") {
            config.kind = kind.parse()?;
        }
        if let Some(path) = lookup("HBNB_FILE_PATH") {
            config.file.path = PathBuf::from(path);
        }
        if let Some(cascade) = lookup("HBNB_FILE_CASCADE") {
            config.file.cascade = match cascade.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "cascade" => CascadePolicy::Cascade,
                _ => CascadePolicy::None,
            };
        }

        // Legacy HBNB_MYSQL_* names are honored when the HBNB_DB_* one is unset
        let db_var = |name: &str, legacy: &str| lookup(name).or_else(|| lookup(legacy));
        config.db.user = db_var("HBNB_DB_USER", "HBNB_MYSQL_USER");
        config.db.password = db_var("HBNB_DB_PWD", "HBNB_MYSQL_PWD");
        config.db.host = db_var("HBNB_DB_HOST", "HBNB_MYSQL_HOST");
        if let Some(name) = db_var("HBNB_DB_NAME", "HBNB_MYSQL_DB") {
            config.db.name = name;
        }
        if let Some(env) = lookup("HBNB_ENV") {
            config.db.environment = Environment::parse(&env);
        }
        if let Some(ms) = lookup("HBNB_DB_TIMEOUT_MS") {
            config.db.timeout_ms = ms.trim().parse().map_err(|_| {
                StorageError::InvalidConfig(format!("HBNB_DB_TIMEOUT_MS is not a number: {}", ms))
            })?;
        }
        if let Some(size) = lookup("HBNB_DB_POOL_SIZE") {
            config.db.pool_size = size.trim().parse().map_err(|_| {
                StorageError::InvalidConfig(format!("HBNB_DB_POOL_SIZE is not a number: {}", size))
            })?;
        }

        config.db.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| StorageError::file_io(path, e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| StorageError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.db.validate()?;
        Ok(config)
    }

    pub fn with_kind(mut self, kind: StorageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_file(mut self, file: FileConfig) -> Self {
        self.file = file;
        self
    }

    pub fn with_db(mut self, db: DbConfig) -> Self {
        self.db = db;
        self
    }
}
