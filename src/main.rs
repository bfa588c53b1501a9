//! Quarry crawler binary
//!
//! Reads its whole configuration from `CRAWLER_*` environment variables,
//! spawns one crawler instance per seed under a supervisor, serves the
//! admin HTTP surface, and shuts everything down gracefully on Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info};

use quarry::config::{self, AppConfig, StorageBackend};
use quarry::crawler::{Crawler, CrawlerSupervisor};
use quarry::metrics::CrawlerMetrics;
use quarry::server;
use quarry::storage::{DocIndexStore, JsonFileStore, PageStore};

#[tokio::main]
async fn main() -> Result<()> {
    config::init_logging("info");

    let app = AppConfig::from_env()?;

    let store = build_store(&app).await?;
    let metrics = CrawlerMetrics::shared(app.crawl.enable_full_content);

    let supervisor = Arc::new(CrawlerSupervisor::new());
    for (i, seed) in app.seeds.iter().enumerate() {
        let mut crawl_config = app.crawl.clone();
        crawl_config.start_url = seed.clone();

        let instance_metrics = crawl_config.enable_metrics.then(|| Arc::clone(&metrics));
        let crawler = match Crawler::new(crawl_config, Arc::clone(&store), instance_metrics) {
            Ok(crawler) => Arc::new(crawler),
            Err(e) => {
                error!(seed = %seed, error = %e, "Skipping seed");
                continue;
            }
        };

        let id = format!("crawler_{}", i + 1);
        supervisor.add(id.clone(), Arc::clone(&crawler));
        supervisor.start(&id);
        info!(id = %id, seed = %seed, "Started crawler");
    }

    if supervisor.all_ids().is_empty() {
        anyhow::bail!("no crawler instance could be started");
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server_metrics = Arc::clone(&metrics);
    let http_addr = app.http_addr.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run(http_addr, server_metrics, shutdown_rx).await {
            error!(error = %e, "Admin server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    supervisor.stop_all().await;
    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn build_store(app: &AppConfig) -> Result<Arc<dyn PageStore>> {
    match &app.storage {
        StorageBackend::JsonFile { path } => {
            let store = JsonFileStore::new(path.clone());
            store.initialize().await?;
            info!(path = %path.display(), "Using JSON file storage");
            Ok(Arc::new(store))
        }
        StorageBackend::DocIndex { base_url, index } => {
            let store = DocIndexStore::new(base_url.clone(), index.clone());
            store
                .initialize(
                    quarry::storage::DEFAULT_READY_RETRIES,
                    quarry::storage::DEFAULT_INITIAL_BACKOFF,
                )
                .await?;
            info!(backend = %base_url, index = %index, "Using document-index storage");
            Ok(Arc::new(store))
        }
    }
}
