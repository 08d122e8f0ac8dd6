//! Data models.

use std::fmt;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Shared identifier under which a sender publishes its location.
///
/// Room codes are opaque: the relay never interprets them beyond requiring
/// a non-empty value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl TryFrom<String> for RoomCode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(AppError::InvalidRoomCode(value));
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for RoomCode {
    type Error = AppError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl From<RoomCode> for String {
    fn from(value: RoomCode) -> Self {
        value.0
    }
}

const GENERATED_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GENERATED_LEN: usize = 6;

impl RoomCode {
    /// Random six character code of `A-Z` and `0-9`
    pub fn generate() -> Self {
        let code = (0..GENERATED_LEN)
            .map(|_| GENERATED_ALPHABET[rand::random_range(0..GENERATED_ALPHABET.len())] as char)
            .collect::<String>();
        Self(code)
    }

    /// Get the raw room code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Current time at the precision the database keeps (microseconds).
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Location record waiting to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    pub room_code: RoomCode,
    pub coordinates: Coordinates,
    pub timestamp: DateTime<Utc>,
}

impl NewLocation {
    /// Create a record stamped with the current time
    pub fn now(room_code: RoomCode, coordinates: Coordinates) -> Self {
        Self {
            room_code,
            coordinates,
            timestamp: now(),
        }
    }
}

/// Stored location record
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    /// Surrogate key, increasing in insertion order
    pub id: i64,
    pub room_code: RoomCode,
    pub latitude: f64,
    pub longitude: f64,
    /// Time the coordinates were reported
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocationRecord {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Overwrite the coordinates and move the timestamp to `at`.
    ///
    /// The timestamp always advances, even when `at` is not later than the
    /// stored value.
    pub fn relocate(&mut self, coordinates: Coordinates, at: DateTime<Utc>) {
        self.latitude = coordinates.latitude;
        self.longitude = coordinates.longitude;
        self.timestamp = at.max(self.timestamp + TimeDelta::microseconds(1));
    }

    pub fn reading(&self) -> LocationReading {
        LocationReading {
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp: self.timestamp,
        }
    }
}

/// Request body of the create and update endpoints.
///
/// Every field is optional so that missing values can be reported with the
/// relay's own validation message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    #[serde(default)]
    pub room_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl LocationPayload {
    pub fn new(room_code: &RoomCode, coordinates: Coordinates) -> Self {
        Self {
            room_code: Some(room_code.to_string()),
            latitude: Some(coordinates.latitude),
            longitude: Some(coordinates.longitude),
        }
    }

    /// Split into a validated room code and coordinates, if all are present
    pub fn into_parts(self) -> Option<(RoomCode, Coordinates)> {
        let room_code = RoomCode::try_from(self.room_code?).ok()?;
        Some((room_code, Coordinates::new(self.latitude?, self.longitude?)))
    }
}

/// Request body of the read endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCodePayload {
    #[serde(default)]
    pub room_code: Option<String>,
}

impl RoomCodePayload {
    pub fn new(room_code: &RoomCode) -> Self {
        Self {
            room_code: Some(room_code.to_string()),
        }
    }

    pub fn into_room_code(self) -> Option<RoomCode> {
        RoomCode::try_from(self.room_code?).ok()
    }
}

/// Latest location under a room code, as returned by the read endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationReading {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationReading {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Success acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure body returned by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
