//! hookgate webhook admission service.
//!
//! Main entry point. Loads configuration, initializes tracing, selects the
//! record store and serves the admission pipeline until shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use hookgate_api::{start_server, AppState, Config};
use hookgate_core::{InMemoryStore, PostgresStore, RecordStore, SystemClock};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!("Starting hookgate webhook admission service");
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        idempotency_ttl_seconds = config.idempotency_ttl_seconds,
        "Configuration loaded"
    );

    let addr = config.parse_server_addr()?;
    let (store, pool) = create_store(&config).await?;

    let state = AppState::new(config.pipeline_settings(), store, Arc::new(SystemClock));

    info!(addr = %addr, "hookgate is ready to receive webhooks");
    start_server(state, addr, config.request_timeout()).await.context("Server failed")?;

    if let Some(pool) = pool {
        pool.close().await;
        info!("Database connections closed");
    }

    info!("hookgate shutdown complete");
    Ok(())
}

/// Initializes tracing. `RUST_LOG` wins over the configured directive.
fn init_tracing(default_directive: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .context("Invalid log filter directive")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Picks PostgreSQL when a database URL is configured, memory otherwise.
async fn create_store(config: &Config) -> Result<(Arc<dyn RecordStore>, Option<sqlx::PgPool>)> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("No database configured, records are kept in memory only");
        return Ok((Arc::new(InMemoryStore::new()), None));
    };

    let pool = create_database_pool(config, url).await?;
    info!("Database connection pool established");

    let store = PostgresStore::new(pool.clone());
    store.ensure_schema().await.context("Failed to prepare database schema")?;
    info!("Database schema ready");

    Ok((Arc::new(store), Some(pool)))
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config, url: &str) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(config.database_connection_timeout())
            .connect(url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}
