//! Embedded, file-backed store on top of SQLite.
//!
//! Entries live in a single `WITHOUT ROWID` table keyed by the cache key, so
//! the file is an ordered key-value B-tree. There is no expiry: operators who
//! care about disk growth must prune the file themselves (or pick redis).
//!
//! # Layout
//!
//! ```text
//! <dir>/locations.sqlite3
//!   locations(key TEXT PRIMARY KEY, value BLOB)   -- value = codec::encode(..)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::{KeyScheme, LocationStore, StoreError, codec};
use crate::location::Location;

/// File name of the database inside the store directory.
pub const DB_FILE: &str = "locations.sqlite3";

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS locations (
    key   TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
) WITHOUT ROWID";

/// Persistent store that survives restarts.
///
/// SQLite calls are blocking, so every operation is moved onto tokio's
/// blocking pool. The connection sits behind a mutex and is taken out on
/// [`close`](LocationStore::close).
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
    dir: PathBuf,
    keys: KeyScheme,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("dir", &self.dir)
            .field("open", &self.conn.lock().is_some())
            .finish()
    }
}

impl SqliteStore {
    /// Opens (or creates) the store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`] if the directory cannot be created.
    /// - [`StoreError::Sqlite`] if the database cannot be opened or migrated.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(DB_FILE);
        info!(path = %path.display(), "opening sqlite location store");

        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            dir,
            keys: KeyScheme::prefixed(KeyScheme::NAMESPACE),
        })
    }

    /// Opens the store in [`default_dir`](Self::default_dir).
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(Self::default_dir()?)
    }

    /// The per-user application data directory: `<data dir>/geocoding/locations`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoDataDir`] when the platform exposes no data directory.
    pub fn default_dir() -> Result<PathBuf, StoreError> {
        dirs::data_dir()
            .map(|base| base.join("geocoding").join("locations"))
            .ok_or(StoreError::NoDataDir)
    }

    /// Replaces the key derivation.
    #[must_use]
    pub fn with_key_scheme(mut self, keys: KeyScheme) -> Self {
        self.keys = keys;
        self
    }

    /// Returns the directory holding the database file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // Run `op` against the open connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            let conn = guard.as_ref().ok_or(StoreError::Closed)?;
            op(conn)
        })
        .await?
    }
}

#[async_trait]
impl LocationStore for SqliteStore {
    fn build_key(&self, query: &str) -> String {
        self.keys.build(query)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<Location>>, StoreError> {
        let key = key.to_owned();
        let raw = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM locations WHERE key = ?1",
                        params![key],
                        |row| row.get::<_, Vec<u8>>(0),
                    )
                    .optional()?)
            })
            .await?;

        codec::decode_stored(raw.as_deref())
    }

    async fn set(&self, key: &str, locations: &[Location]) -> Result<(), StoreError> {
        let value = codec::encode(locations)?;
        let key = key.to_owned();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO locations (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || match conn.lock().take() {
            Some(conn) => {
                debug!("closing sqlite location store");
                conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
            }
            None => Ok(()),
        })
        .await?
    }
}
