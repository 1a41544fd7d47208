//! Store configuration and the backend factory.

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use crate::{
    cache::DEFAULT_SNAPSHOT_CACHE_CAPACITY,
    errors::DagStoreError,
    store::{GraphStore, MemoryGraphStore, SqliteGraphStore},
};

/// Storage backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Durable SQLite tables; the default.
    #[default]
    Sqlite,
    /// Per-graph arenas held in process memory. Nothing survives a restart.
    Memory,
}

impl BackendKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sqlite" => Some(BackendKind::Sqlite),
            "memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Memory => "memory",
        }
    }
}

/// Options for the SQLite backend.
///
/// ```rust
/// use dagstore::SqliteConfig;
/// let config = SqliteConfig::default();
/// assert_eq!(config.pool_size, 4);
/// assert!(!config.without_migrations);
/// assert!(config.pragma_settings.is_empty());
/// assert_eq!(config.snapshot_cache_capacity, 256);
/// ```
#[derive(Clone, Debug)]
pub struct SqliteConfig {
    /// Connections kept open against a file database. In-memory databases
    /// always use exactly one.
    pub pool_size: usize,

    /// How long a statement waits on another connection's lock before failing.
    pub busy_timeout: Duration,

    /// How long an operation waits for an idle pooled connection.
    pub checkout_timeout: Duration,

    /// Skip pending schema migrations on open.
    ///
    /// Only safe when the file is known to be at the current schema version.
    pub without_migrations: bool,

    /// Extra `PRAGMA key = value` statements applied to every connection
    /// after the built-in ones.
    pub pragma_settings: HashMap<String, String>,

    /// Most graph snapshots a store keeps cached before evicting the least
    /// recently read one. Zero disables caching.
    pub snapshot_cache_capacity: usize,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            busy_timeout: Duration::from_secs(5),
            checkout_timeout: Duration::from_secs(30),
            without_migrations: false,
            pragma_settings: HashMap::new(),
            snapshot_cache_capacity: DEFAULT_SNAPSHOT_CACHE_CAPACITY,
        }
    }
}

/// Complete store configuration.
///
/// ```rust
/// use dagstore::{BackendKind, StoreConfig};
/// let config = StoreConfig::default();
/// assert_eq!(config.backend, BackendKind::Sqlite);
/// assert!(config.snapshot_cache);
///
/// let memory = StoreConfig::memory();
/// assert_eq!(memory.backend, BackendKind::Memory);
/// ```
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub sqlite: SqliteConfig,
    /// Cache fetched snapshots (SQLite backend only).
    pub snapshot_cache: bool,
}

impl StoreConfig {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            sqlite: SqliteConfig::default(),
            snapshot_cache: backend == BackendKind::Sqlite,
        }
    }

    pub fn sqlite() -> Self {
        Self::new(BackendKind::Sqlite)
    }

    pub fn memory() -> Self {
        Self::new(BackendKind::Memory)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(BackendKind::Sqlite)
    }
}

/// Open the configured backend.
///
/// `path` names the SQLite database file; `None` opens a private in-memory
/// database. The memory backend ignores `path`.
///
/// ```rust
/// use dagstore::{GraphStore, StoreConfig, open_store};
/// let store = open_store(None, &StoreConfig::sqlite()).unwrap();
/// assert_eq!(store.graph_count().unwrap(), 0);
/// ```
pub fn open_store(
    path: Option<&Path>,
    cfg: &StoreConfig,
) -> Result<Arc<dyn GraphStore>, DagStoreError> {
    match cfg.backend {
        BackendKind::Sqlite => Ok(Arc::new(SqliteGraphStore::with_config(
            path,
            &cfg.sqlite,
            cfg.snapshot_cache,
        )?)),
        BackendKind::Memory => Ok(Arc::new(MemoryGraphStore::new())),
    }
}
