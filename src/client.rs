//! HTTP client for the relay API

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    api::{CREATE_PATH, READ_PATH, UPDATE_PATH},
    config::ClientConfig,
    models::{
        Coordinates, ErrorResponse, LocationPayload, LocationReading, MessageResponse, RoomCode,
        RoomCodePayload,
    },
};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The relay answered with a failure status
    #[error("{message}")]
    Api { status: StatusCode, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Transport(e) => e.status(),
            ClientError::Api { status, .. } => Some(*status),
        }
    }
}

/// Operations of the relay API used by the client loops
#[async_trait]
pub trait LocationApi: Send + Sync + 'static {
    /// Publish a new location under `room_code`
    async fn create_location(
        &self,
        room_code: &RoomCode,
        coordinates: Coordinates,
    ) -> Result<String, ClientError>;

    /// Overwrite the location published under `room_code`
    async fn update_location(
        &self,
        room_code: &RoomCode,
        coordinates: Coordinates,
    ) -> Result<String, ClientError>;

    /// Fetch the latest location published under `room_code`
    async fn read_location(&self, room_code: &RoomCode) -> Result<LocationReading, ClientError>;
}

/// reqwest-backed [`LocationApi`]
#[derive(Debug, Clone)]
pub struct LocationClient {
    http: reqwest::Client,
    base_url: String,
}

impl LocationClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self::with_client(http, &config.base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self.http.post(url).json(body).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Unexpected response")
            .to_string(),
    };
    Err(ClientError::Api { status, message })
}

#[async_trait]
impl LocationApi for LocationClient {
    async fn create_location(
        &self,
        room_code: &RoomCode,
        coordinates: Coordinates,
    ) -> Result<String, ClientError> {
        let response: MessageResponse = self
            .post(CREATE_PATH, &LocationPayload::new(room_code, coordinates))
            .await?;
        Ok(response.message)
    }

    async fn update_location(
        &self,
        room_code: &RoomCode,
        coordinates: Coordinates,
    ) -> Result<String, ClientError> {
        let response: MessageResponse = self
            .post(UPDATE_PATH, &LocationPayload::new(room_code, coordinates))
            .await?;
        Ok(response.message)
    }

    async fn read_location(&self, room_code: &RoomCode) -> Result<LocationReading, ClientError> {
        self.post(READ_PATH, &RoomCodePayload::new(room_code)).await
    }
}
