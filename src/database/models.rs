// src/database/models.rs
use chrono::{DateTime, Utc};

use crate::{
    errors::StoreError,
    models::{LocationRecord, RoomCode},
};

/// Column list shared by every query returning a [`LocationRow`]
pub(crate) const LOCATION_COLUMNS: &str =
    "id, room_code, latitude, longitude, timestamp, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LocationRow {
    id: i64,
    room_code: String,
    latitude: f64,
    longitude: f64,
    timestamp: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LocationRow> for LocationRecord {
    type Error = StoreError;

    fn try_from(row: LocationRow) -> Result<Self, Self::Error> {
        let room_code =
            RoomCode::try_from(row.room_code).map_err(|e| StoreError::CorruptRecord {
                id: row.id,
                reason: e.to_string(),
            })?;

        Ok(LocationRecord {
            id: row.id,
            room_code,
            latitude: row.latitude,
            longitude: row.longitude,
            timestamp: row.timestamp,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
