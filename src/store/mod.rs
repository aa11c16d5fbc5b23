//! Location storage: the cache half of the cache-aside resolver.
//!
//! Every backend implements [`LocationStore`], so the resolver and the binary
//! only ever hold an `Arc<dyn LocationStore>` chosen at startup:
//!
//! | Backend          | Persistence          | Eviction                  | Default key          |
//! |------------------|----------------------|---------------------------|----------------------|
//! | [`MemoryStore`]  | none                 | none                      | `query`              |
//! | [`SqliteStore`]  | file on disk         | none (operator-managed)   | `geocode:query`      |
//! | [`RedisStore`]   | redis server         | server `maxmemory` policy | `geocode:lowercased` |
//!
//! Values are opaque to the stores: the persistent backends keep the JSON
//! encoding produced by [`codec`], the memory store keeps the vector itself.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::location::Location;

pub mod codec;
mod key;
pub mod memory;
pub mod redis;
pub mod sqlite;

pub use key::KeyScheme;
pub use memory::MemoryStore;
pub use self::redis::RedisStore;
pub use sqlite::SqliteStore;

/// Errors raised by a storage backend.
///
/// A missing key is never an error; `get` reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("cannot encode or decode cached locations: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("failed to prepare store directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not determine an application data directory")]
    NoDataDir,

    #[error("store has been closed")]
    Closed,

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Key-value storage for geocoding results.
///
/// Keys come from [`build_key`](Self::build_key); callers must not invent their
/// own. Implementations handle their own internal locking and are shared across
/// tasks behind an `Arc`.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Translates a query into the key used for `get` and `set`. Pure, no I/O.
    fn build_key(&self, query: &str) -> String;

    /// Returns the locations stored under `key`, or `None` when nothing is stored.
    async fn get(&self, key: &str) -> Result<Option<Vec<Location>>, StoreError>;

    /// Stores `locations` under `key`, replacing any previous value.
    async fn set(&self, key: &str, locations: &[Location]) -> Result<(), StoreError>;

    /// Releases the backend. Calling it again is a no-op.
    async fn close(&self) -> Result<(), StoreError>;
}
