use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sietch_common::ServerSnapshot;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::store::{
    PersistSummary, SnapshotStore, StoreCounts, StoredObservation, StoredServer, column_i32,
};
use crate::error::StorageError;

type ObservationKey = (i32, String, DateTime<Utc>);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    servers: Vec<StoredServer>,
    observations: BTreeMap<ObservationKey, (i32, i32)>,
}

impl MemoryState {
    fn upsert_server(&mut self, name: &str, region: &str) -> i32 {
        if let Some(server) = self.servers.iter_mut().find(|s| s.name == name) {
            server.region = region.to_string();
            return server.id;
        }
        let id = self.servers.len() as i32 + 1;
        self.servers.push(StoredServer {
            id,
            name: name.to_string(),
            region: region.to_string(),
            created_at: Utc::now(),
        });
        id
    }
}

/// In-process store with the same upsert rules as [`super::pg_store::PgStore`].
///
/// A batch is applied to a copy of the state and swapped in only when every
/// row succeeded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn servers(&self) -> Result<Vec<StoredServer>, StorageError> {
        let state = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(state.servers.clone())
    }

    pub fn observations(&self) -> Result<Vec<StoredObservation>, StorageError> {
        let state = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(state
            .observations
            .iter()
            .map(|((server_id, name, timestamp), (player_count, max_players))| StoredObservation {
                server_id: *server_id,
                name: name.clone(),
                player_count: *player_count,
                max_players: *max_players,
                timestamp: *timestamp,
            })
            .collect())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn init_schema(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn persist(
        &self,
        snapshots: &[ServerSnapshot],
        observed_at: DateTime<Utc>,
    ) -> Result<PersistSummary, StorageError> {
        let mut state = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        let mut next = state.clone();
        let mut summary = PersistSummary::default();

        for snapshot in snapshots {
            let server_id = next.upsert_server(&snapshot.name, &snapshot.region);
            summary.servers += 1;

            for reading in &snapshot.sietches {
                let counts = (
                    column_i32("player_count", reading.player_count)?,
                    column_i32("max_players", reading.max_players)?,
                );
                next.observations
                    .insert((server_id, reading.name.clone(), observed_at), counts);
                summary.observations += 1;
            }
        }

        *state = next;
        Ok(summary)
    }

    async fn counts(&self) -> Result<StoreCounts, StorageError> {
        let state = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(StoreCounts {
            servers: state.servers.len() as i64,
            observations: state.observations.len() as i64,
        })
    }
}
