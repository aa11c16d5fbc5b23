//! Fetcher for the Nominatim search API.
//!
//! Requests look like:
//!
//! ```text
//! GET https://nominatim.openstreetmap.org/search?q=Galway%2C+Ireland&format=json
//! User-Agent: geocache/0.1.0
//! ```
//!
//! Nominatim's usage policy requires an identifying `User-Agent` and at most
//! one request per second; pair this fetcher with
//! [`Throttled`](super::Throttled).

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{FetchError, LocationFetcher};
use crate::location::Location;

/// Public Nominatim instance.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Identifying client header sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("geocache/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Geocodes queries through a Nominatim instance.
#[derive(Debug, Clone)]
pub struct NominatimFetcher {
    client: reqwest::Client,
    search_url: String,
}

/// Builder for [`NominatimFetcher`].
///
/// # Examples
///
/// ```
/// use geocache::fetcher::NominatimFetcher;
///
/// let fetcher = NominatimFetcher::builder()
///     .base_url("http://localhost:8088")
///     .user_agent("my-app (ops@example.com)")
///     .build()
///     .unwrap();
/// assert_eq!(fetcher.search_url(), "http://localhost:8088/search");
/// ```
#[derive(Debug, Clone)]
pub struct NominatimBuilder {
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl Default for NominatimBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl NominatimBuilder {
    /// Points the fetcher at another instance (self-hosted or a test server).
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the identifying `User-Agent` header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the overall per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the fetcher.
    ///
    /// # Errors
    ///
    /// [`FetchError::Request`] if the HTTP client cannot be initialised.
    pub fn build(self) -> Result<NominatimFetcher, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent)
            .timeout(self.timeout)
            .build()?;
        let search_url = format!("{}/search", self.base_url.trim_end_matches('/'));
        Ok(NominatimFetcher { client, search_url })
    }
}

impl NominatimFetcher {
    /// Starts a builder with the public instance and default user agent.
    pub fn builder() -> NominatimBuilder {
        NominatimBuilder::default()
    }

    /// The search endpoint requests are sent to.
    pub fn search_url(&self) -> &str {
        &self.search_url
    }
}

#[async_trait]
impl LocationFetcher for NominatimFetcher {
    async fn fetch(&self, query: &str) -> Result<Vec<Location>, FetchError> {
        debug!(query = %query, "fetching location from nominatim");

        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| FetchError::Parse { source, body })
    }
}
