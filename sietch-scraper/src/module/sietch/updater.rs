///! Sietch population updater
///!
///! Renders the server-status page, extracts snapshots, persists them and
///! caches the latest result in memory.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use sietch_common::ServerSnapshot;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::browser::PageRenderer;
use super::parser::extract;
use super::store::SnapshotStore;
use crate::error::PipelineError;

/// Result of one successful pass
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    /// Shared timestamp of every observation written in this pass
    pub observed_at: DateTime<Utc>,
    pub servers: Vec<ServerSnapshot>,
}

/// Shared updater: owns the renderer, store and in-memory cache.
pub struct SietchUpdater {
    url: String,
    renderer: Arc<dyn PageRenderer>,
    store: Arc<dyn SnapshotStore>,
    /// Serializes passes so two triggers never write the same instant
    run_lock: Mutex<()>,
    /// Most recent successful pass (None until the first one)
    latest: Arc<RwLock<Option<ScrapeResult>>>,
}

impl SietchUpdater {
    pub fn new(
        url: impl Into<String>,
        renderer: Arc<dyn PageRenderer>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            url: url.into(),
            renderer,
            store,
            run_lock: Mutex::new(()),
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        self.store.clone()
    }

    pub async fn latest(&self) -> Option<ScrapeResult> {
        self.latest.read().await.clone()
    }

    /// Render → extract → persist one cycle.
    pub async fn update(&self) -> Result<ScrapeResult, PipelineError> {
        let _guard = self.run_lock.lock().await;

        tracing::info!("Scraping server status from {}", self.url);
        let html = self.renderer.render(&self.url).await?;

        let servers = extract(&html)?;

        // Postgres keeps microseconds; truncate so re-runs hit the same key.
        let observed_at = Utc::now().trunc_subsecs(6);

        let summary = self.store.persist(&servers, observed_at).await?;
        tracing::info!(
            "Stored {} servers / {} sietch observations at {}",
            summary.servers,
            summary.observations,
            observed_at
        );

        let result = ScrapeResult {
            observed_at,
            servers,
        };
        *self.latest.write().await = Some(result.clone());

        Ok(result)
    }
}
