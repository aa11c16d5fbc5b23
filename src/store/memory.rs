//! In-process store backed by a `HashMap`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use super::{KeyScheme, LocationStore, StoreError};
use crate::location::Location;

/// Non-persistent store. Nothing is ever evicted: once set, a value stays
/// until it is overwritten or the process exits.
///
/// Reads share the lock; writes take it exclusively.
///
/// # Examples
///
/// ```
/// use geocache::location::Location;
/// use geocache::store::{LocationStore, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), geocache::store::StoreError> {
/// let store = MemoryStore::new();
/// let key = store.build_key("Brussels");
/// store.set(&key, &[Location::new("Brussels, Belgium", "50.8503", "4.3517")]).await?;
///
/// let found = store.get(&key).await?.unwrap_or_default();
/// assert_eq!(found[0].latitude(), "50.8503");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<Location>>>,
    keys: KeyScheme,
    closed: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store whose keys are the queries themselves.
    pub fn new() -> Self {
        info!("using in-memory location store");
        Self {
            entries: RwLock::new(HashMap::new()),
            keys: KeyScheme::identity(),
            closed: AtomicBool::new(false),
        }
    }

    /// Replaces the key derivation.
    #[must_use]
    pub fn with_key_scheme(mut self, keys: KeyScheme) -> Self {
        self.keys = keys;
        self
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    fn build_key(&self, query: &str) -> String {
        self.keys.build(query)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<Location>>, StoreError> {
        self.ensure_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, locations: &[Location]) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.entries
            .write()
            .insert(key.to_owned(), locations.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.entries.write().clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::tests::{brussels, exercise_store};

    #[tokio::test]
    async fn satisfies_store_contract() {
        exercise_store(&MemoryStore::new()).await;
    }

    #[test]
    fn key_is_the_query() {
        let store = MemoryStore::new();
        assert_eq!(store.build_key("Brussels"), "Brussels");
        assert_ne!(store.build_key("Brussels"), store.build_key("BRUSSELS"));
    }

    #[tokio::test]
    async fn empty_value_is_present() {
        let store = MemoryStore::new();
        store.set("nowhere", &[]).await.unwrap();
        assert_eq!(store.get("nowhere").await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn custom_key_scheme() {
        let store =
            MemoryStore::new().with_key_scheme(KeyScheme::prefixed("geocode:").lowercase(true));
        assert_eq!(store.build_key("Brussels"), "geocode:brussels");
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.set("a", &[brussels()]).await.unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.get("a").await, Err(StoreError::Closed)));
        assert!(matches!(
            store.set("a", &[brussels()]).await,
            Err(StoreError::Closed)
        ));
    }

    #[tokio::test]
    async fn concurrent_writers_and_readers() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let key = format!("q{i}");
                store.set(&key, &[brussels()]).await.unwrap();
                store.get(&key).await.unwrap()
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), Some(vec![brussels()]));
        }
        assert_eq!(store.len(), 16);
    }
}
