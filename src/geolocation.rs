//! Device position sources for the sender

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Coordinates;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    #[error("No position source is available")]
    Unsupported,

    #[error("Position unavailable: {0}")]
    Unavailable(String),
}

/// Source of the device's current position
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError>;
}

/// Position given up front, e.g. on the command line
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Coordinates);

#[async_trait]
impl Geolocator for FixedPosition {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        let Coordinates {
            latitude,
            longitude,
        } = self.0;

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeolocationError::Unavailable(format!(
                "coordinates out of range: {latitude}, {longitude}"
            )));
        }
        Ok(self.0)
    }
}

/// Stand-in when the device has no position source
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeolocation;

#[async_trait]
impl Geolocator for NoGeolocation {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        Err(GeolocationError::Unsupported)
    }
}
