//! Bot API wire types, plus the request-scoped upload description.
//!
//! Only the fields this service reads are modelled; everything else in Telegram's payloads is
//! ignored on deserialization.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::ChatId;

/// Upload category, chosen from the MIME type. Each kind maps to its own Bot API method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Photo,
    Audio,
    Video,
    Document,
}

impl FileKind {
    /// Classify by MIME prefix. Anything that isn't an image, audio or video is a document.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            FileKind::Photo
        } else if mime_type.starts_with("audio/") {
            FileKind::Audio
        } else if mime_type.starts_with("video/") {
            FileKind::Video
        } else {
            FileKind::Document
        }
    }

    /// Bot API method used to upload this kind
    pub fn method(self) -> &'static str {
        match self {
            FileKind::Photo => "sendPhoto",
            FileKind::Audio => "sendAudio",
            FileKind::Video => "sendVideo",
            FileKind::Document => "sendDocument",
        }
    }

    /// Multipart field carrying the file for this kind's method
    pub fn field_name(self) -> &'static str {
        match self {
            FileKind::Photo => "photo",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
            FileKind::Document => "document",
        }
    }
}

/// A file received from the uploader, held in memory for the duration of one request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub content: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: Bytes) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }

    /// Lower-cased text after the last `.` of the name, or the whole name when it has no `.`.
    pub fn extension(&self) -> String {
        self.name.rsplit('.').next().unwrap_or_default().to_lowercase()
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_mime(&self.mime_type)
    }
}

/// Standard Bot API response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// Result of `getFile`.
#[derive(Debug, Deserialize)]
pub struct TelegramFile {
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineKeyboardButton {
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: Some(url.into()),
            callback_data: None,
        }
    }

    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: Some(data.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: &'a ChatId,
    pub text: &'a str,
    pub parse_mode: &'static str,
    pub disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
pub struct AnswerCallbackQueryRequest<'a> {
    pub callback_query_id: &'a str,
    pub text: &'a str,
    pub show_alert: bool,
}

#[derive(Debug, Serialize)]
pub struct GetFileRequest<'a> {
    pub file_id: &'a str,
}

/// Button press delivered in a webhook update. Only these updates are of interest.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub data: Option<String>,
    pub message: Option<CallbackMessage>,
}

/// The message the pressed button is attached to.
#[derive(Debug, Deserialize)]
pub struct CallbackMessage {
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
}

/// Formatting span in a delivered message. Offsets and lengths count UTF-16 code units.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
}
