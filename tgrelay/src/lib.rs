//! # tgrelay: file hosting on top of a Telegram chat
//!
//! `tgrelay` accepts file uploads over HTTP, stores each file as a message in a configured
//! Telegram chat through the Bot API, and hands back a short path built from Telegram's file id.
//! The same path can later be fetched from the relay, which resolves the id with `getFile` and
//! streams the bytes back from Telegram's file servers. Telegram is the only storage; the relay
//! keeps no file content of its own.
//!
//! ## Request Flow
//!
//! ### Uploads (`POST /upload`)
//!
//! The multipart `file` field is read into memory and classified by MIME type into a photo,
//! audio, video or document upload, each of which maps to its own Bot API method. The
//! [`telegram::TelegramClient`] sends it with a small retry policy: images Telegram refuses as
//! photos are resent as documents, and transport failures are retried with a growing delay, all
//! within one retry budget. The file id is taken from Telegram's response and returned as
//! `[{"src": "/file/{file_id}.{extension}"}]`.
//!
//! After a successful upload two best-effort side effects run: the file is recorded in the
//! optional [metadata store](store), and a notification with the file details and two buttons
//! is posted to the notification chat. Neither can fail the upload.
//!
//! ### Button presses (`POST /webhook`)
//!
//! Telegram delivers presses of the notification's "copy link" button as callback queries.
//! The handler recovers the file URL from the notification text and answers with an alert
//! holding it.
//!
//! ### Downloads (`GET /file/{name}`)
//!
//! Files on the store's block list are reported as missing; everything else is resolved with
//! `getFile` and streamed through.
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and environment overrides. At minimum a bot token and a
//! chat id are required:
//!
//! ```bash
//! TG_BOT_TOKEN="123456:ABC-DEF" TG_CHAT_ID=-1001234567890 tgrelay
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod notifications;
mod openapi;
pub mod store;
pub mod telegram;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::openapi::ApiDoc;
use crate::store::MetadataStore;
use crate::telegram::TelegramClient;

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .telegram(TelegramClient::new(&config.telegram)?)
///     .maybe_store(store)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub telegram: TelegramClient,
    /// Upload bookkeeping, when a backend is configured
    pub store: Option<Arc<dyn MetadataStore>>,
}

/// Build the application router with all routes and middleware.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let upload_limit = state.config.max_upload_size;
    let enable_metrics = state.config.enable_metrics;

    let mut router = Router::new()
        .route(
            "/upload",
            post(api::handlers::uploads::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/webhook", post(api::handlers::webhook::telegram_webhook))
        .route("/file/{name}", get(api::handlers::files::get_file))
        .route("/healthz", get(api::handlers::healthz))
        .with_state(state)
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    // Add Prometheus metrics if enabled
    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    // Add tracing layer
    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router and its configuration.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] builds the Telegram client, the metadata store and the
///    router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, in-flight requests finish and
///    telemetry is flushed
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!(
            bind_address = %config.bind_address(),
            notifications = config.notifications.enabled,
            "Starting relay"
        );

        let telegram = TelegramClient::new(&config.telegram)?;
        let store = store::from_config(&config.metadata_store)?;
        if store.is_none() {
            info!("No metadata store configured, uploads will not be recorded");
        }

        let app_state = AppState::builder()
            .config(config.clone())
            .telegram(telegram)
            .maybe_store(store)
            .build();

        let router = build_router(app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Relay listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Shutdown telemetry
        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
