//! HTTP endpoints
//!
//! | Path               | Operation        | Success                                 |
//! |--------------------|------------------|-----------------------------------------|
//! | `/api/location`    | create location  | 201 `{message}`                         |
//! | `/api/polling`     | update location  | 200 `{message}`                         |
//! | `/api/getlocation` | read location    | 200 `{latitude, longitude, timestamp}`  |
//!
//! Failures carry `{error}` with status 400, 404 or 500.

mod error;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::{
    database::LocationStore,
    models::{
        self, LocationPayload, LocationReading, MessageResponse, NewLocation, RoomCodePayload,
    },
};

pub use error::ApiError;

pub const CREATE_PATH: &str = "/api/location";
pub const UPDATE_PATH: &str = "/api/polling";
pub const READ_PATH: &str = "/api/getlocation";

const LOCATION_REQUIRED: &str = "Room code, latitude, and longitude are required.";
const ROOM_CODE_REQUIRED: &str = "Room code is required.";
const SAVE_FAILED: &str = "Failed to save location. Please try again.";
const UPDATE_FAILED: &str = "Failed to update location. Please try again.";
const FETCH_FAILED: &str = "Failed to fetch location. Please try again.";

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LocationStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn LocationStore>) -> Self {
        Self { store }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CREATE_PATH, post(create_location))
        .route(UPDATE_PATH, post(update_location))
        .route(READ_PATH, post(read_location))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bodies are parsed by hand so that malformed JSON and missing fields
/// share the endpoint's validation message.
fn parse_body<T: DeserializeOwned>(body: &Bytes, message: &'static str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!("Rejecting request body: {}", e);
        ApiError::Validation(message)
    })
}

pub async fn create_location(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let (room_code, coordinates) = parse_body::<LocationPayload>(&body, LOCATION_REQUIRED)?
        .into_parts()
        .ok_or(ApiError::Validation(LOCATION_REQUIRED))?;

    let record = state
        .store
        .insert(NewLocation::now(room_code, coordinates))
        .await
        .map_err(ApiError::internal(SAVE_FAILED))?;
    info!(room_code = %record.room_code, id = record.id, "Location saved");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Location saved successfully.")),
    ))
}

/// Overwrites the first record found for the room code, which is not
/// necessarily the one `read_location` returns.
pub async fn update_location(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let (room_code, coordinates) = parse_body::<LocationPayload>(&body, LOCATION_REQUIRED)?
        .into_parts()
        .ok_or(ApiError::Validation(LOCATION_REQUIRED))?;

    let mut record = state
        .store
        .find_any(&room_code)
        .await
        .map_err(ApiError::internal(UPDATE_FAILED))?
        .ok_or(ApiError::NotFound)?;

    record.relocate(coordinates, models::now());
    state
        .store
        .save(&record)
        .await
        .map_err(ApiError::internal(UPDATE_FAILED))?;
    debug!(room_code = %record.room_code, id = record.id, "Location updated");

    Ok(Json(MessageResponse::new("Location updated successfully.")))
}

pub async fn read_location(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LocationReading>, ApiError> {
    let room_code = parse_body::<RoomCodePayload>(&body, ROOM_CODE_REQUIRED)?
        .into_room_code()
        .ok_or(ApiError::Validation(ROOM_CODE_REQUIRED))?;

    let record = state
        .store
        .find_newest(&room_code)
        .await
        .map_err(ApiError::internal(FETCH_FAILED))?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(record.reading()))
}

async fn health() -> &'static str {
    "ok"
}
