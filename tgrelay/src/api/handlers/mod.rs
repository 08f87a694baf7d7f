//! HTTP request handlers.
//!
//! - [`uploads`]: multipart upload relayed to Telegram
//! - [`webhook`]: callback queries from notification buttons
//! - [`files`]: file download by the name returned from an upload
//!
//! Handlers return [`crate::errors::Error`], which converts to the status code and body each
//! route's callers expect.

pub mod files;
pub mod uploads;
pub mod webhook;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    responses((status = 200, description = "Service is running", body = String))
)]
pub async fn healthz() -> &'static str {
    "OK"
}
