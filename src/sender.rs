//! Sender loop: publish one position under a room code and keep refreshing it
//!
//! ```text
//! Idle -> Locating -> Ready -> Sending -> PollingUpdates
//!             \                   \            \
//!              +-------------------+------------+--> Failed
//! ```
//!
//! The device position is read once. Every update re-sends those same
//! coordinates so that the record's timestamp keeps moving. A rejected
//! update is skipped; only a network failure ends the cycle.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ClientError, LocationApi},
    geolocation::{GeolocationError, Geolocator},
    models::{Coordinates, RoomCode},
};

#[derive(Debug, Clone, PartialEq)]
pub enum SenderStatus {
    Idle,
    Locating,
    /// Position acquired
    Ready,
    /// Initial create request in flight
    Sending,
    /// Update cycle running
    PollingUpdates { updates: u64 },
    Failed(String),
}

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Geolocation is not supported on this device.")]
    Unsupported,

    #[error("Failed to get location.")]
    Geolocation(#[source] GeolocationError),

    #[error("Location and room code are required.")]
    NotReady,

    #[error("{0}")]
    Client(#[from] ClientError),
}

impl From<GeolocationError> for SenderError {
    fn from(value: GeolocationError) -> Self {
        match value {
            GeolocationError::Unsupported => SenderError::Unsupported,
            other => SenderError::Geolocation(other),
        }
    }
}

struct Cycle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Sender<A: LocationApi> {
    api: Arc<A>,
    update_interval: Duration,
    coordinates: Option<Coordinates>,
    room_code: Option<RoomCode>,
    status: Arc<watch::Sender<SenderStatus>>,
    cycle: Option<Cycle>,
}

impl<A: LocationApi> Sender<A> {
    pub fn new(api: Arc<A>, update_interval: Duration) -> Self {
        let (status, _) = watch::channel(SenderStatus::Idle);
        Self {
            api,
            update_interval,
            coordinates: None,
            room_code: None,
            status: Arc::new(status),
            cycle: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SenderStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SenderStatus {
        self.status.borrow().clone()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    pub fn room_code(&self) -> Option<&RoomCode> {
        self.room_code.as_ref()
    }

    /// Acquire the device position once. Failures are final.
    pub async fn locate(&mut self, geolocator: &dyn Geolocator) -> Result<Coordinates, SenderError> {
        self.status.send_replace(SenderStatus::Locating);

        match geolocator.current_position().await {
            Ok(coordinates) => {
                info!(
                    "Position acquired: {}, {}",
                    coordinates.latitude, coordinates.longitude
                );
                self.coordinates = Some(coordinates);
                self.status.send_replace(SenderStatus::Ready);
                Ok(coordinates)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Pick a fresh random room code
    pub fn generate_room_code(&mut self) -> &RoomCode {
        self.room_code.insert(RoomCode::generate())
    }

    pub fn set_room_code(&mut self, room_code: RoomCode) {
        self.room_code = Some(room_code);
    }

    /// Create the location record, then start the update cycle
    pub async fn send(&mut self) -> Result<(), SenderError> {
        self.stop().await;

        let (Some(coordinates), Some(room_code)) = (self.coordinates, self.room_code.clone())
        else {
            return Err(self.fail(SenderError::NotReady));
        };

        self.status.send_replace(SenderStatus::Sending);
        if let Err(e) = self.api.create_location(&room_code, coordinates).await {
            return Err(self.fail(e.into()));
        }
        info!("Location published under room code {}", room_code);

        self.status
            .send_replace(SenderStatus::PollingUpdates { updates: 0 });

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(update_cycle(
            self.api.clone(),
            room_code,
            coordinates,
            self.update_interval,
            self.status.clone(),
            cancel.clone(),
        ));
        self.cycle = Some(Cycle { cancel, handle });

        Ok(())
    }

    /// Wait until the update cycle ends on its own, i.e. after a failure
    pub async fn finished(&mut self) {
        if let Some(cycle) = self.cycle.as_mut() {
            if let Err(e) = (&mut cycle.handle).await {
                error!("Update cycle task failed: {}", e);
            }
            self.cycle = None;
        }
    }

    /// Cancel the update cycle, including an in-flight request
    pub async fn stop(&mut self) {
        let Some(cycle) = self.cycle.take() else {
            return;
        };

        cycle.cancel.cancel();
        if let Err(e) = cycle.handle.await {
            error!("Update cycle task failed: {}", e);
        }

        self.status.send_if_modified(|status| {
            if matches!(status, SenderStatus::PollingUpdates { .. }) {
                *status = SenderStatus::Ready;
                true
            } else {
                false
            }
        });
        debug!("Update cycle stopped");
    }

    fn fail(&self, error: SenderError) -> SenderError {
        warn!("Sender failed: {}", error);
        self.status
            .send_replace(SenderStatus::Failed(error.to_string()));
        error
    }
}

impl<A: LocationApi> Drop for Sender<A> {
    fn drop(&mut self) {
        if let Some(cycle) = &self.cycle {
            cycle.cancel.cancel();
        }
    }
}

async fn update_cycle<A: LocationApi>(
    api: Arc<A>,
    room_code: RoomCode,
    coordinates: Coordinates,
    period: Duration,
    status: Arc<watch::Sender<SenderStatus>>,
    cancel: CancellationToken,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut updates = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.update_location(&room_code, coordinates) => result,
        };

        match result {
            Ok(_) => {
                updates += 1;
                debug!("Update {} sent for room code {}", updates, room_code);
                status.send_replace(SenderStatus::PollingUpdates { updates });
            }
            Err(ClientError::Api { status: code, message }) => {
                warn!("Location update rejected ({}): {}", code, message);
            }
            Err(e) => {
                error!("Location update failed, stopping: {}", e);
                status.send_replace(SenderStatus::Failed(SenderError::from(e).to_string()));
                break;
            }
        }
    }
}
