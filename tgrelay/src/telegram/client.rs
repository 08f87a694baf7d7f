//! Outbound Bot API client.
//!
//! Media uploads go through [`TelegramClient::send_file`], which owns the retry policy:
//!
//! ```text
//! attempt ──► 2xx ───────────────────────────────► Success { payload }
//!    │
//!    ├──► non-2xx, kind = photo, retries left ───► resend same bytes as document
//!    ├──► non-2xx otherwise ─────────────────────► Failure { status_code: Some(..) }
//!    ├──► transport error, retries left ─────────► sleep backoff × n, resend unchanged
//!    └──► transport error, no retries left ──────► Failure { status_code: None }
//! ```
//!
//! Both retry triggers draw from a single budget of [`MAX_RETRIES`], so a call chain never
//! makes more than `1 + MAX_RETRIES` requests.

use std::time::Duration;

use anyhow::{Context, anyhow};
use metrics::counter;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::types::{
    AnswerCallbackQueryRequest, ApiResponse, FileKind, GetFileRequest, InlineKeyboardMarkup, SendMessageRequest, TelegramFile,
    UploadedFile,
};
use crate::config::{ChatId, TelegramConfig};

/// Retries allowed beyond the first attempt, shared by the photo fallback and transport retries.
pub const MAX_RETRIES: u32 = 2;

const UPLOAD_FAILED: &str = "Upload to Telegram failed";
const NETWORK_ERROR: &str = "Network error occurred";

/// Outcome of a media upload after retries.
#[derive(Debug)]
pub enum SendOutcome {
    /// Telegram accepted the file; `payload` is the full response body
    Success { payload: Value },
    /// `status_code` is `None` when Telegram could not be reached at all
    Failure { status_code: Option<u16>, message: String },
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    chat_id: ChatId,
    retry_backoff: Duration,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Self> {
        let chat_id = config.chat_id.clone().context("telegram.chat_id is not configured")?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create Telegram HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.as_str().trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id,
            retry_backoff: config.retry_backoff,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url, self.bot_token, file_path.trim_start_matches('/'))
    }

    /// Upload a file to the storage chat, retrying per the policy in the module docs.
    #[instrument(skip(self, file), fields(file_name = %file.name, size = file.size_bytes))]
    pub async fn send_file(&self, kind: FileKind, file: &UploadedFile) -> SendOutcome {
        let mut kind = kind;
        let mut retries = 0;

        loop {
            match self.post_media(kind, file).await {
                Ok((status, payload)) if status.is_success() => {
                    debug!(method = kind.method(), retries, "Telegram accepted upload");
                    return SendOutcome::Success { payload };
                }
                Ok((status, payload)) => {
                    if retries < MAX_RETRIES && kind == FileKind::Photo {
                        warn!(status = status.as_u16(), "sendPhoto rejected, retrying as document");
                        counter!("tgrelay_telegram_retries_total", "reason" => "photo_fallback").increment(1);
                        kind = FileKind::Document;
                        retries += 1;
                        continue;
                    }

                    let message = payload
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| UPLOAD_FAILED.to_string());
                    warn!(status = status.as_u16(), method = kind.method(), %message, "Telegram rejected upload");
                    return SendOutcome::Failure {
                        status_code: Some(status.as_u16()),
                        message,
                    };
                }
                Err(e) => {
                    if retries < MAX_RETRIES {
                        let delay = self.retry_backoff * (retries + 1);
                        warn!(error = %e, attempt = retries + 1, ?delay, "Telegram request failed, retrying");
                        counter!("tgrelay_telegram_retries_total", "reason" => "network").increment(1);
                        tokio::time::sleep(delay).await;
                        retries += 1;
                        continue;
                    }

                    warn!(error = %e, method = kind.method(), "Telegram unreachable, giving up");
                    return SendOutcome::Failure {
                        status_code: None,
                        message: NETWORK_ERROR.to_string(),
                    };
                }
            }
        }
    }

    /// One multipart upload attempt.
    ///
    /// A 2xx body that isn't JSON counts as a transport failure. Rejections are returned with
    /// whatever JSON they carry, or `Null` for HTML error pages from proxies in front of the API.
    async fn post_media(&self, kind: FileKind, file: &UploadedFile) -> reqwest::Result<(reqwest::StatusCode, Value)> {
        let part = || Part::stream_with_length(file.content.clone(), file.size_bytes).file_name(file.name.clone());
        // An unparseable MIME type is sent without a content type rather than failing the upload
        let part = part().mime_str(&file.mime_type).unwrap_or_else(|_| part());
        let form = Form::new()
            .text("chat_id", self.chat_id.to_string())
            .part(kind.field_name(), part);

        let response = self.client.post(self.api_url(kind.method())).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let payload = response.json::<Value>().await.unwrap_or(Value::Null);
            return Ok((status, payload));
        }

        let payload = response.json::<Value>().await?;
        Ok((status, payload))
    }

    /// Post a JSON request to a Bot API method and decode its `result`.
    async fn call<B, T>(&self, method: &str, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request failed"))?;

        let status = response.status();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Telegram {method} returned an unreadable body"))?;

        if !status.is_success() || !parsed.ok {
            return Err(anyhow!(
                "Telegram {method} failed ({status}): {}",
                parsed.description.as_deref().unwrap_or("no description")
            ));
        }

        parsed.result.ok_or_else(|| anyhow!("Telegram {method} returned no result"))
    }

    /// Send an HTML-formatted text message.
    pub async fn send_message(&self, chat_id: &ChatId, text: &str, reply_markup: Option<&InlineKeyboardMarkup>) -> anyhow::Result<()> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
            reply_markup,
        };
        self.call::<_, Value>("sendMessage", &request).await?;
        Ok(())
    }

    /// Acknowledge a button press, optionally as a pop-up alert.
    pub async fn answer_callback_query(&self, callback_query_id: &str, text: &str, show_alert: bool) -> anyhow::Result<()> {
        let request = AnswerCallbackQueryRequest {
            callback_query_id,
            text,
            show_alert,
        };
        self.call::<_, Value>("answerCallbackQuery", &request).await?;
        Ok(())
    }

    /// Resolve a file id to its download path. `Ok(None)` when Telegram doesn't know the id.
    pub async fn get_file_path(&self, file_id: &str) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .post(self.api_url("getFile"))
            .json(&GetFileRequest { file_id })
            .send()
            .await
            .context("Telegram getFile request failed")?;

        let status = response.status();
        let parsed: ApiResponse<TelegramFile> = response.json().await.context("Telegram getFile returned an unreadable body")?;

        if !status.is_success() || !parsed.ok {
            debug!(file_id, description = ?parsed.description, "getFile did not resolve");
            return Ok(None);
        }

        Ok(parsed.result.and_then(|file| file.file_path))
    }

    /// Start downloading a file by the path returned from `getFile`.
    pub async fn download(&self, file_path: &str) -> anyhow::Result<reqwest::Response> {
        let response = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .context("Telegram file download failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("Telegram file download failed with status {}", response.status()));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::types::InlineKeyboardButton;
    use crate::test_utils::install_crypto_provider;
    use bytes::Bytes;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> TelegramConfig {
        install_crypto_provider();
        TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: Some(ChatId::Id(-100)),
            notification_chat_id: None,
            api_base_url: server.uri().parse().unwrap(),
            request_timeout: Duration::from_millis(200),
            retry_backoff: Duration::from_millis(10),
        }
    }

    fn png() -> UploadedFile {
        UploadedFile::new("a.png", "image/png", Bytes::from_static(b"fake-png-bytes"))
    }

    fn photo_ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"message_id": 1, "photo": [{"file_id": "p1", "file_size": 10}]}
        }))
    }

    fn rejected() -> ResponseTemplate {
        ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: PHOTO_INVALID_DIMENSIONS"
        }))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .respond_with(photo_ok())
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        match client.send_file(FileKind::Photo, &png()).await {
            SendOutcome::Success { payload } => assert_eq!(payload["result"]["photo"][0]["file_id"], "p1"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_photo_rejection_falls_back_to_document_with_same_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .respond_with(rejected())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendDocument"))
            .and(body_string_contains("name=\"document\""))
            .and(body_string_contains("fake-png-bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"document": {"file_id": "d1"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let outcome = client.send_file(FileKind::Photo, &png()).await;
        assert!(matches!(outcome, SendOutcome::Success { .. }), "{outcome:?}");
    }

    #[tokio::test]
    async fn test_document_rejection_fails_with_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendDocument"))
            .respond_with(rejected())
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let file = UploadedFile::new("a.txt", "text/plain", Bytes::from_static(b"hello"));
        match client.send_file(FileKind::Document, &file).await {
            SendOutcome::Failure { status_code, message } => {
                assert_eq!(status_code, Some(400));
                assert_eq!(message, "Bad Request: PHOTO_INVALID_DIMENSIONS");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejection_without_description_uses_generic_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"ok": false})))
            .expect(2)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        match client.send_file(FileKind::Photo, &png()).await {
            SendOutcome::Failure { status_code, message } => {
                assert_eq!(status_code, Some(500));
                assert_eq!(message, UPLOAD_FAILED);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failures_are_bounded() {
        let server = MockServer::start().await;
        // Slower than the client timeout, so every attempt is a transport failure
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendVideo"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .expect(1 + MAX_RETRIES as u64)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let file = UploadedFile::new("clip.mp4", "video/mp4", Bytes::from_static(b"video"));
        match client.send_file(FileKind::Video, &file).await {
            SendOutcome::Failure { status_code, message } => {
                assert_eq!(status_code, None);
                assert_eq!(message, NETWORK_ERROR);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreadable_success_body_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendAudio"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>upstream hiccup</html>"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendAudio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"audio": {"file_id": "a1"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let file = UploadedFile::new("song.mp3", "audio/mpeg", Bytes::from_static(b"id3"));
        let outcome = client.send_file(FileKind::Audio, &file).await;
        assert!(matches!(outcome, SendOutcome::Success { .. }), "{outcome:?}");
    }

    #[tokio::test]
    async fn test_html_rejection_is_an_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendAudio"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let file = UploadedFile::new("song.mp3", "audio/mpeg", Bytes::from_static(b"id3"));
        match client.send_file(FileKind::Audio, &file).await {
            SendOutcome::Failure { status_code, message } => {
                assert_eq!(status_code, Some(502));
                assert_eq!(message, UPLOAD_FAILED);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_photo_html_rejection_falls_back_to_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .respond_with(ResponseTemplate::new(413).set_body_string("<html><h1>413 Request Entity Too Large</h1></html>"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendDocument"))
            .and(body_string_contains("fake-png-bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"document": {"file_id": "d1"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        match client.send_file(FileKind::Photo, &png()).await {
            SendOutcome::Success { payload } => assert_eq!(payload["result"]["document"]["file_id"], "d1"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_retries_back_off_linearly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendVideo"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .expect(1 + MAX_RETRIES as u64)
            .mount(&server)
            .await;

        let timeout = Duration::from_millis(100);
        let backoff = Duration::from_millis(300);
        let mut config = test_config(&server);
        config.request_timeout = timeout;
        config.retry_backoff = backoff;

        let client = TelegramClient::new(&config).unwrap();
        let file = UploadedFile::new("clip.mp4", "video/mp4", Bytes::from_static(b"video"));
        let started = std::time::Instant::now();
        let outcome = client.send_file(FileKind::Video, &file).await;
        let elapsed = started.elapsed();

        assert!(matches!(outcome, SendOutcome::Failure { status_code: None, .. }), "{outcome:?}");
        // Three timed-out attempts plus sleeps of 1x and 2x the backoff. A constant delay would
        // finish a full backoff earlier.
        let linear = timeout * 3 + backoff * 3;
        assert!(elapsed >= linear, "elapsed {elapsed:?}, expected at least {linear:?}");
        assert!(elapsed < linear + backoff * 2, "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_upload_part_carries_mime_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .and(body_string_contains("image/png"))
            .respond_with(photo_ok())
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let outcome = client.send_file(FileKind::Photo, &png()).await;
        assert!(matches!(outcome, SendOutcome::Success { .. }), "{outcome:?}");
    }

    #[tokio::test]
    async fn test_invalid_mime_type_is_still_uploaded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendDocument"))
            .and(body_string_contains("not a mime"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendDocument"))
            .and(body_string_contains("name=\"document\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"document": {"file_id": "d1"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let file = UploadedFile::new("a.bin", "not a mime", Bytes::from_static(b"data"));
        let outcome = client.send_file(FileKind::Document, &file).await;
        assert!(matches!(outcome, SendOutcome::Success { .. }), "{outcome:?}");
    }

    #[tokio::test]
    async fn test_retry_budget_is_shared_between_fallback_and_network_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .respond_with(rejected())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendDocument"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .expect(MAX_RETRIES as u64)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let outcome = client.send_file(FileKind::Photo, &png()).await;
        assert!(
            matches!(outcome, SendOutcome::Failure { status_code: None, .. }),
            "{outcome:?}"
        );
    }

    #[tokio::test]
    async fn test_send_message_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": -100,
                "text": "<b>hi</b>",
                "parse_mode": "HTML",
                "reply_markup": {"inline_keyboard": [[{"text": "Copy", "callback_data": "copy_link"}]]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 7}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let markup = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton::callback("Copy", "copy_link")]],
        };
        client.send_message(&ChatId::Id(-100), "<b>hi</b>", Some(&markup)).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_surfaces_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/answerCallbackQuery"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: query is too old"
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let err = client.answer_callback_query("q1", "link", true).await.unwrap_err();
        assert!(err.to_string().contains("query is too old"), "{err}");
    }

    #[tokio::test]
    async fn test_get_file_path_and_download() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getFile"))
            .and(body_partial_json(json!({"file_id": "p1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"file_id": "p1", "file_size": 3, "file_path": "photos/file_0.jpg"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file/bot123:abc/photos/file_0.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpg".to_vec()))
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        let file_path = client.get_file_path("p1").await.unwrap().unwrap();
        assert_eq!(file_path, "photos/file_0.jpg");

        let body = client.download(&file_path).await.unwrap().bytes().await.unwrap();
        assert_eq!(&body[..], b"jpg");
    }

    #[tokio::test]
    async fn test_get_file_path_unknown_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getFile"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: invalid file_id"
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::new(&test_config(&server)).unwrap();
        assert_eq!(client.get_file_path("nope").await.unwrap(), None);
    }
}
