//! Location fetching: the source-of-truth half of the cache-aside resolver.
//!
//! [`LocationFetcher`] turns a free-text query into ranked [`Location`]s.
//! [`NominatimFetcher`] asks the public geocoding service; [`Throttled`]
//! wraps any fetcher so that calls are paced by a shared [`RateLimiter`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use geocache::fetcher::{LocationFetcher, NominatimFetcher, RateLimiter, Throttled};
//!
//! # async fn example() -> Result<(), geocache::fetcher::FetchError> {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_secs(2)));
//! let fetcher = Throttled::new(NominatimFetcher::builder().build()?, limiter);
//! let found = fetcher.fetch("Galway, Ireland").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::location::Location;

pub mod nominatim;
pub mod throttle;

pub use nominatim::{NominatimBuilder, NominatimFetcher};
pub use throttle::{RateLimiter, Throttled};

/// Errors produced while fetching from the upstream service.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to geocoding service failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("geocoding service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot parse geocoding response: {source}; the response body was {body}")]
    Parse {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

/// Resolves a query into ranked locations, best match first.
///
/// An empty vector means the service knows no match; it is not an error here.
#[async_trait]
pub trait LocationFetcher: Send + Sync {
    /// Fetches every location matching `query`.
    async fn fetch(&self, query: &str) -> Result<Vec<Location>, FetchError>;
}
