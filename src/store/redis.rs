//! Remote store on a redis server.
//!
//! No expiry is set on keys. Eviction is left to the server's memory policy,
//! for example:
//!
//! ```text
//! CONFIG SET maxmemory 100mb
//! CONFIG SET maxmemory-policy allkeys-lru
//! ```

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, RedisError};
use tracing::{debug, info};

use super::{KeyScheme, LocationStore, StoreError, codec};
use crate::location::Location;

/// Bound on establishing the connection, including the retries below.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Bound on a single command once connected.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Reconnect attempts per connect before giving up.
const CONNECT_RETRIES: usize = 1;

enum Connection {
    Idle,
    Ready(ConnectionManager),
    Closed,
}

/// Store backed by a redis server.
///
/// Construction only parses the address; the connection is made on first
/// use and re-established by the [`ConnectionManager`] after network errors.
/// A failed connect is reported as [`StoreError::Redis`] within
/// [`CONNECT_TIMEOUT`] and retried by the next request.
/// Keys are lowercased by default, so lookups are case-insensitive.
pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Connection>,
    address: String,
    keys: KeyScheme,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("address", &self.address)
            .finish()
    }
}

impl RedisStore {
    /// Creates a store for `address`, either `host:port` or a full `redis://` URL.
    ///
    /// # Errors
    ///
    /// [`StoreError::Redis`] if the address is not a valid redis URL.
    pub fn new(address: &str) -> Result<Self, StoreError> {
        let url = if address.contains("://") {
            address.to_owned()
        } else {
            format!("redis://{address}")
        };
        let client = redis::Client::open(url.as_str())?;
        info!(address = %address, "using redis location store");

        Ok(Self {
            client,
            conn: Mutex::new(Connection::Idle),
            address: address.to_owned(),
            keys: KeyScheme::prefixed(KeyScheme::NAMESPACE).lowercase(true),
        })
    }

    /// Replaces the key derivation.
    #[must_use]
    pub fn with_key_scheme(mut self, keys: KeyScheme) -> Self {
        self.keys = keys;
        self
    }

    // Returns a handle to the shared connection, connecting on first use.
    // The lock is never held while connecting; concurrent first requests may
    // each connect, and the first to finish is kept.
    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        match &*self.conn.lock() {
            Connection::Ready(manager) => return Ok(manager.clone()),
            Connection::Closed => return Err(StoreError::Closed),
            Connection::Idle => {}
        }

        debug!(address = %self.address, "connecting to redis");
        let manager = self.connect().await?;

        let mut state = self.conn.lock();
        match &*state {
            Connection::Ready(existing) => Ok(existing.clone()),
            Connection::Closed => Err(StoreError::Closed),
            Connection::Idle => {
                *state = Connection::Ready(manager.clone());
                Ok(manager)
            }
        }
    }

    async fn connect(&self) -> Result<ConnectionManager, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(CONNECT_RETRIES)
            .set_connection_timeout(CONNECT_TIMEOUT)
            .set_response_timeout(RESPONSE_TIMEOUT);

        tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client.get_connection_manager_with_config(config),
        )
        .await
        .map_err(|_| {
            RedisError::from(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timed out connecting to redis",
            ))
        })?
        .map_err(StoreError::from)
    }
}

#[async_trait]
impl LocationStore for RedisStore {
    fn build_key(&self, query: &str) -> String {
        self.keys.build(query)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<Location>>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<Vec<u8>> = conn.get(key).await?;
        codec::decode_stored(raw.as_deref())
    }

    async fn set(&self, key: &str, locations: &[Location]) -> Result<(), StoreError> {
        let value = codec::encode(locations)?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut state = self.conn.lock();
        if !matches!(*state, Connection::Closed) {
            debug!(address = %self.address, "closing redis location store");
        }
        // Dropping the last manager handle tears the connection down.
        *state = Connection::Closed;
        Ok(())
    }
}
