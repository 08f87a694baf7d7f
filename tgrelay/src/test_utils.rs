//! Test utilities for handler tests against a mocked Bot API.

use axum_test::TestServer;
use serde_json::json;
use wiremock::ResponseTemplate;

use crate::config::{ChatId, Config, TelegramConfig};
use crate::telegram::TelegramClient;
use crate::{AppState, build_router};

/// Install the TLS crypto provider `main` installs, so HTTP clients can be built in tests.
pub fn install_crypto_provider() {
    // Err only means another test got there first
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Config pointing the Telegram client at `telegram_url` (usually a `wiremock::MockServer`).
///
/// The bot token is `123:abc` and the chat `-100`, so mocks match on `/bot123:abc/{method}`.
pub fn create_test_config(telegram_url: &str) -> Config {
    install_crypto_provider();
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        telegram: TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: Some(ChatId::Id(-100)),
            api_base_url: telegram_url.parse().expect("valid mock server URL"),
            request_timeout: std::time::Duration::from_secs(5),
            retry_backoff: std::time::Duration::from_millis(10),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// State without a metadata store. Tests that need one set `state.store` directly.
pub fn create_test_state(config: Config) -> AppState {
    let telegram = TelegramClient::new(&config.telegram).expect("Failed to create Telegram client");
    AppState::builder().config(config).telegram(telegram).build()
}

pub fn create_test_server(state: AppState) -> TestServer {
    let router = build_router(state).expect("Failed to build router");
    TestServer::new(router.into_make_service()).expect("Failed to create test server")
}

/// `sendPhoto` success carrying a single photo size with the given id.
pub fn photo_sent(file_id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": {
            "message_id": 1,
            "photo": [{"file_id": file_id, "file_unique_id": "u", "width": 90, "height": 90, "file_size": 10}]
        }
    }))
}
