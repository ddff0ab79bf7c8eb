use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vuokra_watch::config::Config;
use vuokra_watch::reconciler::start_periodic;
use vuokra_watch::{LogNotifier, Reconciler, Store, VuokraoviScraper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🏠 Vuokra Watch - vuokraovi.com listing watcher");

    let config = Config::from_env()?;
    let request = config.search_request().await?;

    let store = Arc::new(Store::open(&config.data_dir).await);

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(VuokraoviScraper::new()),
        Arc::clone(&store),
        request,
    ));

    info!(
        interval = ?config.update_interval,
        max_pages = config.max_pages,
        "Starting periodic updates"
    );
    let periodic = start_periodic(reconciler, Arc::new(LogNotifier), config.schedule()).await;

    info!(
        listings = store.known_listings().await.len(),
        last_updated = %store.last_updated().await,
        "Ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    periodic.abort();

    Ok(())
}
