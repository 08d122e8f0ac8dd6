// src/database/memory.rs
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::LocationStore;
use crate::{
    errors::StoreError,
    models::{self, LocationRecord, NewLocation, RoomCode},
};

/// In-process location store.
///
/// Keeps the same ordering rules as the PostgreSQL store but loses every
/// record when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<Table>,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<LocationRecord>,
    last_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, across all room codes
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn insert(&self, location: NewLocation) -> Result<LocationRecord, StoreError> {
        let mut table = self.table.write().await;
        table.last_id += 1;

        let created_at = models::now();
        let record = LocationRecord {
            id: table.last_id,
            room_code: location.room_code,
            latitude: location.coordinates.latitude,
            longitude: location.coordinates.longitude,
            timestamp: location.timestamp,
            created_at,
            updated_at: created_at,
        };
        table.rows.push(record.clone());

        Ok(record)
    }

    async fn find_newest(&self, room_code: &RoomCode) -> Result<Option<LocationRecord>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .filter(|row| &row.room_code == room_code)
            .max_by_key(|row| (row.timestamp, row.id))
            .cloned())
    }

    async fn find_any(&self, room_code: &RoomCode) -> Result<Option<LocationRecord>, StoreError> {
        // Rows are kept in id order
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .find(|row| &row.room_code == room_code)
            .cloned())
    }

    async fn save(&self, record: &LocationRecord) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let row = table
            .rows
            .iter_mut()
            .find(|row| row.id == record.id)
            .ok_or(StoreError::MissingRecord(record.id))?;

        row.latitude = record.latitude;
        row.longitude = record.longitude;
        row.timestamp = record.timestamp;
        row.updated_at = models::now();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::models::Coordinates;

    fn room(code: &str) -> RoomCode {
        RoomCode::try_from(code).unwrap()
    }

    #[tokio::test]
    async fn find_newest_prefers_latest_timestamp() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let code = room("ABC123");

        let first = NewLocation::now(code.clone(), Coordinates::new(1.0, 2.0));
        let mut second = NewLocation::now(code.clone(), Coordinates::new(3.0, 4.0));
        second.timestamp = first.timestamp + TimeDelta::seconds(5);

        // Insert the newer row first so insertion order and time order differ
        store.insert(second).await?;
        store.insert(first).await?;

        let newest = store.find_newest(&code).await?.unwrap();
        assert_eq!(newest.coordinates(), Coordinates::new(3.0, 4.0));

        let any = store.find_any(&code).await?.unwrap();
        assert_eq!(any.id, 1);
        Ok(())
    }

    #[tokio::test]
    async fn lookups_are_scoped_to_room_code() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store
            .insert(NewLocation::now(room("ONE"), Coordinates::new(1.0, 1.0)))
            .await?;

        assert!(store.find_newest(&room("TWO")).await?.is_none());
        assert!(store.find_any(&room("TWO")).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn save_overwrites_single_row() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let code = room("ABC123");
        store
            .insert(NewLocation::now(code.clone(), Coordinates::new(1.0, 2.0)))
            .await?;
        store
            .insert(NewLocation::now(code.clone(), Coordinates::new(5.0, 6.0)))
            .await?;

        let mut record = store.find_any(&code).await?.unwrap();
        record.relocate(Coordinates::new(3.0, 4.0), models::now());
        store.save(&record).await?;

        assert_eq!(store.len().await, 2);
        let saved = store.find_any(&code).await?.unwrap();
        assert_eq!(saved.coordinates(), Coordinates::new(3.0, 4.0));
        assert_eq!(saved.timestamp, record.timestamp);
        Ok(())
    }

    #[tokio::test]
    async fn save_unknown_record_fails() {
        let store = MemoryStore::new();
        let now = models::now();
        let record = LocationRecord {
            id: 42,
            room_code: room("GONE"),
            latitude: 0.0,
            longitude: 0.0,
            timestamp: now,
            created_at: now,
            updated_at: now,
        };

        assert!(matches!(
            store.save(&record).await,
            Err(StoreError::MissingRecord(42))
        ));
    }
}
