//! Errors for the location relay
use thiserror::Error;

use crate::{receiver::ReceiverError, sender::SenderError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Invalid room code: {0:?}")]
    InvalidRoomCode(String),

    #[error("Database connection error: {0}")]
    DatabaseConnectionError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),

    #[error("Client error")]
    ClientError(#[from] crate::client::ClientError),

    #[error("Stopped: {0}")]
    LoopStopped(String),

    #[error(transparent)]
    Sender(#[from] SenderError),

    #[error(transparent)]
    Receiver(#[from] ReceiverError),
}

/// Failures of a [`LocationStore`](crate::database::LocationStore) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Stored record {id} is invalid: {reason}")]
    CorruptRecord { id: i64, reason: String },

    #[error("Location record {0} does not exist")]
    MissingRecord(i64),
}
