//! Cache-aside resolution of a query into its best location.
//!
//! ```text
//! key = store.build_key(query)
//! store.get(key) ──hit──▶ first location
//!      │ miss
//!      ▼
//! fetcher.fetch(query) ──empty──▶ NotFound (nothing cached)
//!      │
//!      ▼
//! store.set(key, result)   (failure logged, never returned)
//!      │
//!      ▼
//! first location
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::fetcher::{FetchError, LocationFetcher};
use crate::location::Location;
use crate::store::{LocationStore, StoreError};

/// Why a query could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Reading the cache failed. The fetcher is not consulted.
    #[error("failed to retrieve from the cache: {0}")]
    Store(#[source] StoreError),

    #[error("failed to fetch location: {0}")]
    Fetch(#[source] FetchError),

    #[error("no locations found for query: {query}")]
    NotFound { query: String },
}

/// Answers queries from the store, falling back to the fetcher on a miss.
///
/// Both collaborators are shared trait objects, so one resolver serves every
/// request for the life of the process.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn LocationStore>,
    fetcher: Arc<dyn LocationFetcher>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Resolver {
    /// Creates a resolver over `store` and `fetcher`.
    pub fn new(store: Arc<dyn LocationStore>, fetcher: Arc<dyn LocationFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Resolves `query` to its best (first-ranked) location.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::Store`] when the cache read fails.
    /// - [`ResolveError::Fetch`] when the upstream call fails.
    /// - [`ResolveError::NotFound`] when there is no match, either from the
    ///   upstream or from an empty cached value.
    pub async fn resolve(&self, query: &str) -> Result<Location, ResolveError> {
        let key = self.store.build_key(query);

        if let Some(cached) = self.store.get(&key).await.map_err(ResolveError::Store)? {
            debug!(query = %query, key = %key, "cache hit");
            return first(cached, query);
        }

        debug!(query = %query, key = %key, "cache miss");
        let fetched = self
            .fetcher
            .fetch(query)
            .await
            .map_err(ResolveError::Fetch)?;

        if fetched.is_empty() {
            return Err(not_found(query));
        }

        if let Err(e) = self.store.set(&key, &fetched).await {
            warn!(key = %key, error = %e, "could not cache locations");
        }

        first(fetched, query)
    }
}

fn first(locations: Vec<Location>, query: &str) -> Result<Location, ResolveError> {
    locations
        .into_iter()
        .next()
        .ok_or_else(|| not_found(query))
}

fn not_found(query: &str) -> ResolveError {
    ResolveError::NotFound {
        query: query.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::store::MemoryStore;

    const QUERY: &str = "Brussels";

    fn brussels() -> Location {
        Location::new("Brussels, Belgium", "50.8503", "4.3517")
    }

    // Store whose reads and writes can be forced to fail.
    #[derive(Default)]
    struct ScriptedStore {
        cached: Option<Vec<Location>>,
        fail_get: bool,
        fail_set: bool,
        writes: Mutex<Vec<(String, Vec<Location>)>>,
    }

    #[async_trait]
    impl LocationStore for ScriptedStore {
        fn build_key(&self, query: &str) -> String {
            query.to_owned()
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<Location>>, StoreError> {
            if self.fail_get {
                return Err(StoreError::Closed);
            }
            Ok(self.cached.clone())
        }

        async fn set(&self, key: &str, locations: &[Location]) -> Result<(), StoreError> {
            self.writes
                .lock()
                .push((key.to_owned(), locations.to_vec()));
            if self.fail_set {
                return Err(StoreError::Closed);
            }
            Ok(())
        }

        async fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    // Fetcher returning a fixed answer and counting calls.
    struct CountingFetcher {
        answer: fn() -> Result<Vec<Location>, FetchError>,
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new(answer: fn() -> Result<Vec<Location>, FetchError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LocationFetcher for CountingFetcher {
        async fn fetch(&self, _query: &str) -> Result<Vec<Location>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.answer)()
        }
    }

    fn found() -> Result<Vec<Location>, FetchError> {
        Ok(vec![
            brussels(),
            Location::new("Brussels, Wisconsin", "44.7366", "-87.6209"),
        ])
    }

    fn nothing() -> Result<Vec<Location>, FetchError> {
        Ok(vec![])
    }

    fn broken() -> Result<Vec<Location>, FetchError> {
        Err(FetchError::Status {
            status: 503,
            body: "down".to_owned(),
        })
    }

    #[tokio::test]
    async fn cache_hit_returns_first_and_skips_fetch() {
        let store = Arc::new(ScriptedStore {
            cached: Some(vec![brussels()]),
            ..ScriptedStore::default()
        });
        let fetcher = CountingFetcher::new(found);
        let resolver = Resolver::new(store, fetcher.clone());

        assert_eq!(resolver.resolve(QUERY).await.unwrap(), brussels());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn miss_fetches_caches_and_then_hits() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = CountingFetcher::new(found);
        let resolver = Resolver::new(store.clone(), fetcher.clone());

        assert_eq!(resolver.resolve(QUERY).await.unwrap(), brussels());
        assert_eq!(fetcher.calls(), 1);

        // The whole ranked list is cached, not just the first match.
        let key = store.build_key(QUERY);
        assert_eq!(store.get(&key).await.unwrap(), Some(found().unwrap()));

        assert_eq!(resolver.resolve(QUERY).await.unwrap(), brussels());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn empty_fetch_is_not_found_and_not_cached() {
        let store = Arc::new(ScriptedStore::default());
        let resolver = Resolver::new(store.clone(), CountingFetcher::new(nothing));

        let err = resolver.resolve(QUERY).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
        assert_eq!(err.to_string(), "no locations found for query: Brussels");
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_cached_value_is_not_found() {
        let store = Arc::new(ScriptedStore {
            cached: Some(vec![]),
            ..ScriptedStore::default()
        });
        let fetcher = CountingFetcher::new(found);
        let resolver = Resolver::new(store, fetcher.clone());

        assert!(matches!(
            resolver.resolve(QUERY).await,
            Err(ResolveError::NotFound { .. })
        ));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn store_read_failure_aborts_without_fetching() {
        let store = Arc::new(ScriptedStore {
            fail_get: true,
            ..ScriptedStore::default()
        });
        let fetcher = CountingFetcher::new(found);
        let resolver = Resolver::new(store, fetcher.clone());

        let err = resolver.resolve(QUERY).await.unwrap_err();
        assert!(matches!(err, ResolveError::Store(StoreError::Closed)));
        assert_eq!(
            err.to_string(),
            "failed to retrieve from the cache: store has been closed"
        );
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_is_wrapped() {
        let store = Arc::new(ScriptedStore::default());
        let resolver = Resolver::new(store.clone(), CountingFetcher::new(broken));

        let err = resolver.resolve(QUERY).await.unwrap_err();
        assert!(matches!(err, ResolveError::Fetch(_)));
        assert_eq!(
            err.to_string(),
            "failed to fetch location: geocoding service answered 503: down"
        );
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn store_write_failure_still_returns_location() {
        let store = Arc::new(ScriptedStore {
            fail_set: true,
            ..ScriptedStore::default()
        });
        let resolver = Resolver::new(store.clone(), CountingFetcher::new(found));

        assert_eq!(resolver.resolve(QUERY).await.unwrap(), brussels());
        let writes = store.writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, QUERY);
    }
}
