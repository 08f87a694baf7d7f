//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Response bodies shared with the OpenAPI document
//!
//! # Routes
//!
//! - `POST /upload`: multipart upload, stored in the Telegram chat
//! - `POST /webhook`: Telegram update delivery (inline button presses)
//! - `GET /file/{name}`: stream a stored file back from Telegram
//! - `GET /healthz`: liveness
//!
//! API documentation is available at `/docs` when the server is running.

pub mod handlers;
pub mod models;
