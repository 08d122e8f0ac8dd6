use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::{errors::StoreError, models::ErrorResponse};

#[derive(Error, Debug)]
pub enum ApiError {
    /// A required request field is missing or empty
    #[error("{0}")]
    Validation(&'static str),

    #[error("Location with the given room code not found.")]
    NotFound,

    /// Storage failure, reported to the caller with a generic message
    #[error("{message}")]
    Internal {
        message: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ApiError {
    /// Wrap a store error with the endpoint's user-facing message
    pub fn internal(message: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| ApiError::Internal { message, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal { message, source } = &self {
            error!("{}: {}", message, source);
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
