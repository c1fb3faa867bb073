///! Snapshot persistence
///!
///! Servers are upserted by name, sietch observations by
///! (server, sietch, timestamp). Every `persist` call is all-or-nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sietch_common::ServerSnapshot;
use std::sync::Arc;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::error::StorageError;

pub use super::memory_store::MemoryStore;
pub use super::pg_store::PgStore;

/// Rows written by one `persist` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PersistSummary {
    pub servers: usize,
    pub observations: usize,
}

/// Row totals currently in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoreCounts {
    pub servers: i64,
    pub observations: i64,
}

/// A row of the `servers` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredServer {
    pub id: i32,
    pub name: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
}

/// A row of the `sietches` table
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredObservation {
    pub server_id: i32,
    pub name: String,
    pub player_count: i32,
    pub max_players: i32,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Create tables if they do not exist yet.
    async fn init_schema(&self) -> Result<(), StorageError>;

    /// Upsert every snapshot under a single `observed_at`.
    async fn persist(
        &self,
        snapshots: &[ServerSnapshot],
        observed_at: DateTime<Utc>,
    ) -> Result<PersistSummary, StorageError>;

    async fn counts(&self) -> Result<StoreCounts, StorageError>;
}

/// Counts go into `INTEGER` columns.
pub(crate) fn column_i32(field: &'static str, value: u32) -> Result<i32, StorageError> {
    i32::try_from(value).map_err(|_| StorageError::ValueOutOfRange { field, value })
}

/// Open the backend selected in the config.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn SnapshotStore>, StorageError> {
    let store: Arc<dyn SnapshotStore> = match config.backend {
        StoreBackend::Postgres => Arc::new(PgStore::connect(config).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; observations are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}
