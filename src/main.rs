use std::sync::Arc;

use geocache::app;
use geocache::config::Config;
use geocache::resolver::Resolver;
use geocache::server::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_args()?;

    let default_level = if config.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = config.open_store()?;
    let fetcher = config.fetcher()?;
    let resolver = Arc::new(Resolver::new(Arc::clone(&store), fetcher));

    let server = Server::bind(&config.address).await?;
    info!(address = %server.local_addr(), backend = ?config.backend, "geocache starting");

    let served = app::serve(server, app::routes(resolver, config.trusted_proxies.clone()), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await;

    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close location store");
    }

    served?;
    Ok(())
}
