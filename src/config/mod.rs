//! Startup configuration: command-line flags and the collaborators they select.
//!
//! Backend precedence is `--in-memory`, then `--redis`, then the default
//! on-disk SQLite store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::info;

use crate::fetcher::nominatim::{DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use crate::fetcher::{FetchError, LocationFetcher, NominatimFetcher, RateLimiter, Throttled};
use crate::middleware::{TrustedProxies, TrustedProxyError};
use crate::store::{LocationStore, MemoryStore, RedisStore, SqliteStore, StoreError};

/// Shortest pause between upstream calls the public usage policy allows.
pub const MIN_THROTTLE_MS: u64 = 1000;

/// Default pause between upstream calls.
pub const DEFAULT_THROTTLE_MS: u64 = 2000;

/// Errors that stop the proxy from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("throttle of {millis}ms is below the {minimum}ms minimum")]
    ThrottleTooShort { millis: u64, minimum: u64 },

    #[error("failed to open location store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build upstream client: {0}")]
    Fetcher(#[from] FetchError),

    #[error("failed to configure trusted proxies: {0}")]
    TrustedProxies(#[from] TrustedProxyError),
}

/// Command-line flags.
#[derive(Debug, Clone, Parser)]
#[command(name = "geocache")]
#[command(about = "Caching proxy for the Nominatim geocoding API", long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "localhost:8080")]
    pub address: String,

    /// Cache in a Redis server at this address
    #[arg(long)]
    pub redis: Option<String>,

    /// Cache in process memory (takes precedence over --redis)
    #[arg(long)]
    pub in_memory: bool,

    /// Directory for the on-disk cache [default: OS data directory]
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum pause between upstream calls, in milliseconds
    #[arg(long, default_value_t = DEFAULT_THROTTLE_MS)]
    pub throttle: u64,

    /// User-Agent sent to the geocoding service
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Base URL of the geocoding service
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub upstream: String,

    /// Comma-separated IPs or CIDRs whose X-Forwarded-For is believed
    #[arg(long, default_value = "")]
    pub trusted_proxies: String,

    /// Log at debug level
    #[arg(long)]
    pub debug: bool,
}

/// Which store backs the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    InMemory,
    Redis { address: String },
    /// `dir: None` means the OS data directory.
    Sqlite { dir: Option<PathBuf> },
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub address: String,
    pub backend: Backend,
    pub throttle: Duration,
    pub user_agent: String,
    pub upstream: String,
    pub trusted_proxies: TrustedProxies,
    pub debug: bool,
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.throttle < MIN_THROTTLE_MS {
            return Err(ConfigError::ThrottleTooShort {
                millis: cli.throttle,
                minimum: MIN_THROTTLE_MS,
            });
        }

        let trusted_proxies = TrustedProxies::parse(&cli.trusted_proxies)?;

        let backend = match (cli.in_memory, cli.redis) {
            (true, _) => Backend::InMemory,
            (false, Some(address)) => Backend::Redis { address },
            (false, None) => Backend::Sqlite { dir: cli.data_dir },
        };

        Ok(Self {
            address: cli.address,
            backend,
            throttle: Duration::from_millis(cli.throttle),
            user_agent: cli.user_agent,
            upstream: cli.upstream,
            trusted_proxies,
            debug: cli.debug,
        })
    }
}

impl Config {
    /// Parses and validates the process arguments.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ThrottleTooShort`] for a throttle under [`MIN_THROTTLE_MS`],
    /// [`ConfigError::TrustedProxies`] for a proxy entry that is not an IP or CIDR.
    /// Invalid flags make clap print usage and exit.
    pub fn from_args() -> Result<Self, ConfigError> {
        Cli::parse().try_into()
    }

    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Store`] if the backend cannot be opened.
    pub fn open_store(&self) -> Result<Arc<dyn LocationStore>, ConfigError> {
        let store: Arc<dyn LocationStore> = match &self.backend {
            Backend::InMemory => Arc::new(MemoryStore::new()),
            Backend::Redis { address } => Arc::new(RedisStore::new(address)?),
            Backend::Sqlite { dir: Some(dir) } => Arc::new(SqliteStore::open(dir)?),
            Backend::Sqlite { dir: None } => Arc::new(SqliteStore::open_default()?),
        };
        Ok(store)
    }

    /// Builds the rate-limited upstream fetcher.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Fetcher`] if the HTTP client cannot be initialised.
    pub fn fetcher(&self) -> Result<Arc<dyn LocationFetcher>, ConfigError> {
        let nominatim = NominatimFetcher::builder()
            .base_url(&self.upstream)
            .user_agent(&self.user_agent)
            .build()?;
        let limiter = Arc::new(RateLimiter::new(self.throttle));
        info!(
            upstream = %nominatim.search_url(),
            throttle_ms = limiter.min_interval().as_millis() as u64,
            "upstream configured"
        );
        Ok(Arc::new(Throttled::new(nominatim, limiter)))
    }
}
