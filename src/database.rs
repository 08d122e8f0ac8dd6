// src/database.rs
mod memory;
mod models;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{error, info};

use crate::{
    config::{DatabaseConfig, StoreBackend},
    errors::{AppError, StoreError},
    models::{LocationRecord, NewLocation, RoomCode},
};
use models::{LocationRow, LOCATION_COLUMNS};

pub use memory::MemoryStore;

/// Storage of location records keyed by room code.
///
/// No uniqueness is enforced: a room code can own any number of rows.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Insert a new record; never replaces an existing one
    async fn insert(&self, location: NewLocation) -> Result<LocationRecord, StoreError>;

    /// Record with the greatest timestamp for `room_code`, ties broken by id
    async fn find_newest(&self, room_code: &RoomCode) -> Result<Option<LocationRecord>, StoreError>;

    /// First record for `room_code` in default (insertion) order
    async fn find_any(&self, room_code: &RoomCode) -> Result<Option<LocationRecord>, StoreError>;

    /// Persist the coordinates and timestamp of an existing record
    async fn save(&self, record: &LocationRecord) -> Result<(), StoreError>;

    /// Release backend resources
    async fn close(&self) {}
}

/// Open the store selected in configuration
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn LocationStore>, AppError> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory location store; records are not persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| AppError::ConfigurationError {
                    message: "database.url is required for the postgres backend".to_string(),
                })?;
            let db = Database::from_url(url, config.max_connections).await?;
            Ok(Arc::new(db))
        }
    }
}

/// PostgreSQL location store
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database and apply migrations
    pub async fn from_url(url: &str, max_connections: u32) -> Result<Self, AppError> {
        info!("Connecting to database, max_connections={}", max_connections);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                AppError::DatabaseConnectionError(e.to_string())
            })?;

        Self::new(pool).await
    }

    /// Wrap an existing pool, applying migrations first
    pub async fn new(pool: PgPool) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::MigrationError(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LocationStore for Database {
    async fn insert(&self, location: NewLocation) -> Result<LocationRecord, StoreError> {
        let row: LocationRow = sqlx::query_as(&format!(
            "INSERT INTO locations (room_code, latitude, longitude, timestamp)
             VALUES ($1, $2, $3, $4)
             RETURNING {LOCATION_COLUMNS}"
        ))
        .bind(location.room_code.as_str())
        .bind(location.coordinates.latitude)
        .bind(location.coordinates.longitude)
        .bind(location.timestamp)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_newest(&self, room_code: &RoomCode) -> Result<Option<LocationRecord>, StoreError> {
        let row: Option<LocationRow> = sqlx::query_as(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations
             WHERE room_code = $1
             ORDER BY timestamp DESC, id DESC
             LIMIT 1"
        ))
        .bind(room_code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(LocationRecord::try_from).transpose()
    }

    async fn find_any(&self, room_code: &RoomCode) -> Result<Option<LocationRecord>, StoreError> {
        let row: Option<LocationRow> = sqlx::query_as(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations
             WHERE room_code = $1
             ORDER BY id
             LIMIT 1"
        ))
        .bind(room_code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(LocationRecord::try_from).transpose()
    }

    async fn save(&self, record: &LocationRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE locations
             SET latitude = $2, longitude = $3, timestamp = $4, updated_at = now()
             WHERE id = $1",
        )
        .bind(record.id)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRecord(record.id));
        }
        Ok(())
    }

    async fn close(&self) {
        info!("Closing database connections");
        self.pool.close().await;
    }
}
