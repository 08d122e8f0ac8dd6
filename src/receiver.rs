//! Receiver loop: follow the latest location published under a room code
//!
//! ```text
//! Idle ---------+
//!               +--> Polling -> Stopped
//! AwaitingCode -+       |
//!      ^                |
//!      +---- clear -----+
//! ```
//!
//! Every poll tick is its own request task and may overlap with earlier
//! ones. Ticks are numbered and a response is only applied when its number
//! is newer than the last applied one, so a slow response can never
//! overwrite a fresher reading.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ClientError, LocationApi},
    models::{LocationReading, RoomCode},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverStatus {
    /// No room code submitted yet
    Idle,
    /// Room code cleared, waiting for a new one
    AwaitingCode,
    Polling,
    Stopped(String),
}

/// Everything an observer of the receiver needs to render
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverSnapshot {
    pub status: ReceiverStatus,
    pub room_code: Option<RoomCode>,
    pub reading: Option<LocationReading>,
}

#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("Room code is required")]
    MissingRoomCode,

    #[error("{0}")]
    Client(#[from] ClientError),
}

struct Poll {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Receiver<A: LocationApi> {
    api: Arc<A>,
    poll_interval: Duration,
    state: Arc<watch::Sender<ReceiverSnapshot>>,
    poll: Option<Poll>,
}

impl<A: LocationApi> Receiver<A> {
    pub fn new(api: Arc<A>, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(ReceiverSnapshot {
            status: ReceiverStatus::Idle,
            room_code: None,
            reading: None,
        });
        Self {
            api,
            poll_interval,
            state: Arc::new(state),
            poll: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReceiverSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ReceiverSnapshot {
        self.state.borrow().clone()
    }

    /// Read the location for `room_code` once, then keep polling it
    pub async fn submit(&mut self, room_code: &str) -> Result<LocationReading, ReceiverError> {
        self.halt().await;

        let Ok(room_code) = RoomCode::try_from(room_code) else {
            return Err(self.stop_with(ReceiverError::MissingRoomCode));
        };

        self.state.send_modify(|state| {
            state.status = ReceiverStatus::Polling;
            state.room_code = Some(room_code.clone());
            state.reading = None;
        });

        let reading = match self.api.read_location(&room_code).await {
            Ok(reading) => reading,
            Err(e) => return Err(self.stop_with(e.into())),
        };
        self.state
            .send_modify(|state| state.reading = Some(reading));
        info!("Following room code {}", room_code);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.api.clone(),
            room_code,
            self.poll_interval,
            self.state.clone(),
            cancel.clone(),
        ));
        self.poll = Some(Poll { cancel, handle });

        Ok(reading)
    }

    /// Clear the room code. Stops polling and drops in-flight requests.
    pub async fn clear(&mut self) {
        self.halt().await;
        self.state.send_modify(|state| {
            state.status = ReceiverStatus::AwaitingCode;
            state.room_code = None;
        });
    }

    /// Wait until polling stops on its own, i.e. after an error
    pub async fn finished(&mut self) {
        if let Some(poll) = self.poll.as_mut() {
            if let Err(e) = (&mut poll.handle).await {
                error!("Poll task failed: {}", e);
            }
            self.poll = None;
        }
    }

    async fn halt(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.cancel.cancel();
            if let Err(e) = poll.handle.await {
                error!("Poll task failed: {}", e);
            }
        }
    }

    fn stop_with(&self, error: ReceiverError) -> ReceiverError {
        warn!("Receiver stopped: {}", error);
        self.state
            .send_modify(|state| state.status = ReceiverStatus::Stopped(error.to_string()));
        error
    }
}

impl<A: LocationApi> Drop for Receiver<A> {
    fn drop(&mut self) {
        if let Some(poll) = &self.poll {
            poll.cancel.cancel();
        }
    }
}

type TickResult = (u64, Result<LocationReading, ClientError>);

async fn poll_loop<A: LocationApi>(
    api: Arc<A>,
    room_code: RoomCode,
    period: Duration,
    state: Arc<watch::Sender<ReceiverSnapshot>>,
    cancel: CancellationToken,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<TickResult>();
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Sequence 0 is the initial read done by `submit`
    let mut next_seq = 1u64;
    let mut applied = 0u64;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            Some((seq, result)) = rx.recv() => {
                if seq <= applied {
                    debug!("Discarding stale response {} (applied {})", seq, applied);
                    continue;
                }
                applied = seq;

                match result {
                    Ok(reading) => {
                        state.send_modify(|state| state.reading = Some(reading));
                    }
                    Err(e) => {
                        warn!("Polling room code {} failed, stopping: {}", room_code, e);
                        state.send_modify(|state| {
                            state.status = ReceiverStatus::Stopped(e.to_string());
                        });
                        cancel.cancel();
                        break;
                    }
                }
            }
            _ = interval.tick() => {
                let seq = next_seq;
                next_seq += 1;

                let api = api.clone();
                let room_code = room_code.clone();
                let tx = tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        result = api.read_location(&room_code) => {
                            // Receiver gone means the loop already ended
                            let _ = tx.send((seq, result));
                        }
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::DateTime;
    use reqwest::StatusCode;

    use super::*;
    use crate::models::Coordinates;

    const PERIOD: Duration = Duration::from_millis(100);

    fn reading(latitude: f64, at: i64) -> LocationReading {
        LocationReading {
            latitude,
            longitude: 0.0,
            timestamp: DateTime::from_timestamp(at, 0).unwrap(),
        }
    }

    fn not_found() -> ClientError {
        ClientError::Api {
            status: StatusCode::NOT_FOUND,
            message: "Location with the given room code not found.".to_string(),
        }
    }

    type Scripted = (Duration, Result<LocationReading, ClientError>);

    /// Answers reads from a script, then repeats `fallback` forever
    struct ScriptedApi {
        script: Mutex<VecDeque<Scripted>>,
        fallback: LocationReading,
        reads: AtomicU64,
    }

    impl ScriptedApi {
        fn new(script: Vec<Scripted>, fallback: LocationReading) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                reads: AtomicU64::new(0),
            })
        }

        fn reads(&self) -> u64 {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LocationApi for ScriptedApi {
        async fn create_location(
            &self,
            _room_code: &RoomCode,
            _coordinates: Coordinates,
        ) -> Result<String, ClientError> {
            unreachable!("receiver never creates")
        }

        async fn update_location(
            &self,
            _room_code: &RoomCode,
            _coordinates: Coordinates,
        ) -> Result<String, ClientError> {
            unreachable!("receiver never updates")
        }

        async fn read_location(&self, _room_code: &RoomCode) -> Result<LocationReading, ClientError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some((delay, result)) => {
                    time::sleep(delay).await;
                    result
                }
                None => Ok(self.fallback),
            }
        }
    }

    #[tokio::test]
    async fn empty_room_code_stops_without_request() {
        let api = ScriptedApi::new(vec![], reading(1.0, 1));
        let mut receiver = Receiver::new(api.clone(), PERIOD);

        let err = receiver.submit("").await.unwrap_err();
        assert!(matches!(err, ReceiverError::MissingRoomCode));
        assert_eq!(
            receiver.snapshot().status,
            ReceiverStatus::Stopped("Room code is required".to_string())
        );
        assert_eq!(api.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_error_does_not_start_polling() {
        let api = ScriptedApi::new(vec![(Duration::ZERO, Err(not_found()))], reading(1.0, 1));
        let mut receiver = Receiver::new(api.clone(), PERIOD);

        assert!(receiver.submit("NOPE").await.is_err());
        assert_eq!(
            receiver.snapshot().status,
            ReceiverStatus::Stopped("Location with the given room code not found.".to_string())
        );

        time::sleep(PERIOD * 5).await;
        assert_eq!(api.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_responses_are_discarded() {
        let api = ScriptedApi::new(
            vec![
                (Duration::ZERO, Ok(reading(0.0, 10))),
                // Tick 1 answers after tick 2 does
                (Duration::from_millis(250), Ok(reading(1.0, 11))),
                (Duration::from_millis(10), Ok(reading(2.0, 12))),
            ],
            reading(2.0, 12),
        );
        let mut receiver = Receiver::new(api.clone(), PERIOD);

        let first = receiver.submit("ABC123").await.unwrap();
        assert_eq!(first, reading(0.0, 10));

        // Tick 1 resolves at 350ms, after ticks 2 and 3 were applied
        time::sleep(Duration::from_millis(360)).await;
        let snapshot = receiver.snapshot();
        assert_eq!(snapshot.status, ReceiverStatus::Polling);
        assert_eq!(snapshot.reading, Some(reading(2.0, 12)));
    }

    #[tokio::test(start_paused = true)]
    async fn error_response_stops_polling() {
        let api = ScriptedApi::new(
            vec![
                (Duration::ZERO, Ok(reading(0.0, 10))),
                (Duration::ZERO, Err(not_found())),
            ],
            reading(0.0, 10),
        );
        let mut receiver = Receiver::new(api.clone(), PERIOD);
        receiver.submit("ABC123").await.unwrap();

        receiver.finished().await;
        assert_eq!(
            receiver.snapshot().status,
            ReceiverStatus::Stopped("Location with the given room code not found.".to_string())
        );

        time::sleep(PERIOD * 5).await;
        assert_eq!(api.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_room_code_stops_polling() {
        let api = ScriptedApi::new(vec![], reading(5.0, 20));
        let mut receiver = Receiver::new(api.clone(), PERIOD);
        receiver.submit("ABC123").await.unwrap();

        time::sleep(PERIOD * 2 + PERIOD / 2).await;
        assert_eq!(api.reads(), 3);

        receiver.clear().await;
        let snapshot = receiver.snapshot();
        assert_eq!(snapshot.status, ReceiverStatus::AwaitingCode);
        assert!(snapshot.room_code.is_none());

        time::sleep(PERIOD * 5).await;
        assert_eq!(api.reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn resubmitting_after_clear_resumes_polling() {
        let api = ScriptedApi::new(vec![], reading(5.0, 20));
        let mut receiver = Receiver::new(api.clone(), PERIOD);
        assert_eq!(receiver.snapshot().status, ReceiverStatus::Idle);

        receiver.submit("ABC123").await.unwrap();
        receiver.clear().await;
        assert_eq!(receiver.snapshot().status, ReceiverStatus::AwaitingCode);

        receiver.submit("XYZ789").await.unwrap();
        let snapshot = receiver.snapshot();
        assert_eq!(snapshot.status, ReceiverStatus::Polling);
        assert_eq!(snapshot.room_code.unwrap().as_str(), "XYZ789");
    }

    #[tokio::test(start_paused = true)]
    async fn subscriber_sees_initial_reading() {
        let api = ScriptedApi::new(vec![], reading(5.0, 20));
        let mut receiver = Receiver::new(api.clone(), PERIOD);

        let mut snapshots = receiver.subscribe();
        receiver.submit("ABC123").await.unwrap();

        assert!(snapshots.has_changed().unwrap());
        let snapshot = snapshots.borrow_and_update().clone();
        assert_eq!(snapshot.status, ReceiverStatus::Polling);
        assert_eq!(snapshot.reading, Some(reading(5.0, 20)));
    }
}
