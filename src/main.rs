//! Finance News Ingest — Binary Entrypoint
//! Wires config, store and providers, starts the background scheduler and
//! runs it until the process receives Ctrl-C.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use finance_news_ingest::{ingest, IngestConfig, IngestScheduler, NewsStore, SqliteNewsStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op where the environment is already set.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = IngestConfig::from_env();
    let store: Arc<dyn NewsStore> = Arc::new(SqliteNewsStore::connect(&config.database_url).await?);
    let providers = ingest::default_providers(&config)?;

    let scheduler = IngestScheduler::new(config, store, providers);
    scheduler.start().await;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    scheduler.stop().await;

    Ok(())
}
