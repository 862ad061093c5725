//! Docgate ingest gateway.
//!
//! Main entry point. Loads configuration, prepares the document store and
//! serves the HTTP API until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use docgate_api::{AppState, Config};
use docgate_core::{
    storage::{PostgresDocumentStore, UnconfiguredStore},
    DocumentStore, RealClock,
};
use sqlx::PgPool;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    init_tracing(&config.rust_log)?;

    info!("Starting docgate ingest gateway");
    let masked_url = config.database_url_masked().unwrap_or_else(|| "<unset>".to_string());
    info!(
        database_url = %masked_url,
        max_connections = config.database_max_connections,
        sources = config.sources.len(),
        "Configuration loaded"
    );

    if config.api_secret.as_deref().map_or(true, str::is_empty) {
        warn!("API_SECRET is not set; every API request will be rejected");
    }

    let addr = config.parse_server_addr()?;
    let pool = create_database_pool(&config)?;

    let store: Arc<dyn DocumentStore> = match &pool {
        Some(pool) => Arc::new(PostgresDocumentStore::new(pool.clone())),
        None => {
            warn!("DATABASE_URL is not set; storage operations will fail");
            Arc::new(UnconfiguredStore::new("DATABASE_URL"))
        },
    };

    let state = AppState::new(
        store,
        Arc::new(RealClock::new()),
        config.source_registry()?,
        config.api_key_auth(),
        config.limits(),
    );

    docgate_api::start_server(state, addr).await.context("HTTP server failed")?;

    if let Some(pool) = pool {
        pool.close().await;
        info!("Database connections closed");
    }

    info!("Docgate shutdown complete");
    Ok(())
}

/// Initializes tracing. `RUST_LOG` wins over the configured level.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()?;
    Ok(())
}

/// Creates the connection pool without connecting. The first storage call
/// establishes the connection, so the process starts even when the
/// database is down.
fn create_database_pool(config: &Config) -> Result<Option<PgPool>> {
    let Some(url) = config.database_url.as_deref().filter(|url| !url.is_empty()) else {
        return Ok(None);
    };

    let pool = config.pool_options().connect_lazy(url).context("Invalid DATABASE_URL")?;
    Ok(Some(pool))
}
