//! # geocache
//!
//! A caching proxy in front of the Nominatim geocoding API.
//!
//! `GET /locations/:place` answers from a pluggable [`store`] when it can and
//! otherwise asks the upstream through a rate-limited [`fetcher`], caching what
//! comes back. The HTTP side runs on an in-crate HTTP/1.1 [`server`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use geocache::fetcher::{NominatimFetcher, RateLimiter, Throttled};
//! use geocache::middleware::TrustedProxies;
//! use geocache::resolver::Resolver;
//! use geocache::server::Server;
//! use geocache::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = Throttled::new(
//!         NominatimFetcher::builder().build()?,
//!         Arc::new(RateLimiter::new(Duration::from_secs(2))),
//!     );
//!     let resolver = Resolver::new(Arc::new(MemoryStore::new()), Arc::new(fetcher));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     let routes = geocache::app::routes(Arc::new(resolver), TrustedProxies::none());
//!     geocache::app::serve(server, routes, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

// ── HTTP plumbing ─────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Geocoding ─────────────────────────────────────────────────────────────────
pub mod fetcher;
pub mod location;
pub mod resolver;
pub mod store;

// ── Wiring ────────────────────────────────────────────────────────────────────
pub mod app;
pub mod config;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use location::Location;
pub use resolver::{ResolveError, Resolver};
pub use router::Router;
pub use server::{Server, ServerError};
