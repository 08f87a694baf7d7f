use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Multipart body had no `file` field
    #[error("No file uploaded")]
    NoFileUploaded,

    /// Telegram rejected the upload after all retries
    #[error("{message}")]
    UploadFailed { message: String },

    /// Telegram could not be reached after all retries
    #[error("{message}")]
    NetworkError { message: String },

    /// Telegram accepted the upload but the response carried no file id
    #[error("Failed to get file ID")]
    MissingFileId,

    /// Malformed request body
    #[error("{message}")]
    BadRequest { message: String },

    /// Webhook body that is not a Telegram update
    #[error("Invalid webhook payload: {message}")]
    InvalidWebhookPayload { message: String },

    /// Requested resource not found
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// JSON body returned by the upload endpoint on failure.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            // Upload and webhook failures are all reported as 500 to the caller, including
            // client-side problems such as a missing file field.
            Error::NoFileUploaded
            | Error::UploadFailed { .. }
            | Error::NetworkError { .. }
            | Error::MissingFileId
            | Error::BadRequest { .. }
            | Error::InvalidWebhookPayload { .. }
            | Error::Internal { .. }
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::UploadFailed { .. } | Error::NetworkError { .. } | Error::MissingFileId => {
                tracing::warn!("Telegram upload error: {}", self);
            }
            Error::InvalidWebhookPayload { .. } => {
                tracing::warn!("Webhook error: {}", self);
            }
            Error::NoFileUploaded | Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            // Webhook and file routes answer in plain text
            Error::InvalidWebhookPayload { .. } | Error::NotFound { .. } => (status, self.user_message()).into_response(),
            _ => (status, Json(ErrorBody { error: self.user_message() })).into_response(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
