use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sietch_common::ServerSnapshot;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::store::{
    PersistSummary, SnapshotStore, StoreCounts, StoredObservation, StoredServer, column_i32,
};
use crate::config::DatabaseConfig;
use crate::error::StorageError;

const CREATE_SERVERS: &str = "
    CREATE TABLE IF NOT EXISTS servers (
        id SERIAL PRIMARY KEY,
        name VARCHAR(50) NOT NULL,
        region VARCHAR(50) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE(name)
    )";

const CREATE_SIETCHES: &str = "
    CREATE TABLE IF NOT EXISTS sietches (
        id SERIAL PRIMARY KEY,
        server_id INTEGER NOT NULL REFERENCES servers(id),
        name VARCHAR(50) NOT NULL,
        player_count INTEGER,
        max_players INTEGER,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE(server_id, name, timestamp)
    )";

const UPSERT_SERVER: &str = "
    INSERT INTO servers (name, region)
    VALUES ($1, $2)
    ON CONFLICT (name) DO UPDATE
    SET region = EXCLUDED.region
    RETURNING id";

const UPSERT_SIETCH: &str = "
    INSERT INTO sietches (server_id, name, player_count, max_players, timestamp)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (server_id, name, timestamp) DO UPDATE
    SET player_count = EXCLUDED.player_count,
        max_players = EXCLUDED.max_players";

/// PostgreSQL-backed store; one transaction per `persist` call.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(
            "Connected to PostgreSQL at {}:{}/{}",
            config.host, config.port, config.name
        );
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn servers(&self) -> Result<Vec<StoredServer>, StorageError> {
        let rows = sqlx::query_as::<_, StoredServer>(
            "SELECT id, name, region, created_at FROM servers ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn observations(
        &self,
        observed_at: DateTime<Utc>,
    ) -> Result<Vec<StoredObservation>, StorageError> {
        let rows = sqlx::query_as::<_, StoredObservation>(
            "SELECT server_id, name, player_count, max_players, timestamp
             FROM sietches WHERE timestamp = $1 ORDER BY server_id, name",
        )
        .bind(observed_at)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_SERVERS).execute(&self.pool).await?;
        sqlx::query(CREATE_SIETCHES).execute(&self.pool).await?;
        debug!("Database schema ready");
        Ok(())
    }

    async fn persist(
        &self,
        snapshots: &[ServerSnapshot],
        observed_at: DateTime<Utc>,
    ) -> Result<PersistSummary, StorageError> {
        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;
        let mut summary = PersistSummary::default();

        for snapshot in snapshots {
            let server_id: i32 = sqlx::query_scalar(UPSERT_SERVER)
                .bind(&snapshot.name)
                .bind(&snapshot.region)
                .fetch_one(&mut *tx)
                .await?;
            summary.servers += 1;

            for reading in &snapshot.sietches {
                sqlx::query(UPSERT_SIETCH)
                    .bind(server_id)
                    .bind(&reading.name)
                    .bind(column_i32("player_count", reading.player_count)?)
                    .bind(column_i32("max_players", reading.max_players)?)
                    .bind(observed_at)
                    .execute(&mut *tx)
                    .await?;
                summary.observations += 1;
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    async fn counts(&self) -> Result<StoreCounts, StorageError> {
        let (servers, observations): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM servers), (SELECT COUNT(*) FROM sietches)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreCounts {
            servers,
            observations,
        })
    }
}
