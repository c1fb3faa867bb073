use sietch_scraper::config::{DEFAULT_CONFIG_PATH, ScraperConfig};
use sietch_scraper::module::scheduled::{ScheduledTaskConfig, ScheduledTaskManager};
use sietch_scraper::module::sietch::{ChromeRenderer, SietchUpdater, open_store};
use sietch_scraper::service;

use anyhow::{Context, Result};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ScraperConfig::load(&config_path)?;

    // Initialize logging
    let _logging_guard = sietch_scraper::logging::init_logging(
        &config.log_dir,
        "sietch-scraper",
        &config.log_level,
    )?;

    tracing::info!("Sietch scraper starting...");
    tracing::info!("Scraping {}", config.scraper.url);

    // Open the store and make sure the tables exist
    tracing::info!("Creating database tables...");
    let store = open_store(&config.database)
        .await
        .context("Failed to open snapshot store")?;
    store
        .init_schema()
        .await
        .context("Failed to create database tables")?;

    let renderer = Arc::new(ChromeRenderer::new(config.scraper.clone()));
    let updater = Arc::new(SietchUpdater::new(
        config.scraper.url.clone(),
        renderer,
        store,
    ));

    // Configure and start scheduled scraping
    let task_config = ScheduledTaskConfig {
        update_interval_minutes: config.schedule.interval_minutes,
        perform_initial_update: config.schedule.run_on_startup,
    };
    let mut task_manager = ScheduledTaskManager::new(task_config, updater.clone());
    task_manager.start_all();

    let app = service::router(updater);
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.server_address()))?;

    tracing::info!("HTTP server listening on {}", config.server_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    task_manager.shutdown();
    tracing::info!("Sietch scraper stopped");

    Ok(())
}
