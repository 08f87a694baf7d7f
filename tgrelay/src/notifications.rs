//! Upload notifications posted to the Telegram chat.
//!
//! Each successful upload produces an HTML message with the file details and two buttons: a URL
//! button opening the file, and a "copy link" button. The copy button carries the fixed callback
//! token [`COPY_LINK_CALLBACK`] (callback data is capped at 64 bytes, too short for file ids), so
//! the webhook recovers the link from the message itself. The link is repeated inside a `<pre>`
//! block for that purpose; [`extract_file_url`] is the matching parser.

use std::sync::LazyLock;

use metrics::counter;
use regex::Regex;
use tracing::{debug, instrument};

use crate::config::{ChatId, NotificationsConfig};
use crate::telegram::TelegramClient;
use crate::telegram::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageEntity};

/// Callback data attached to the "copy link" button.
pub const COPY_LINK_CALLBACK: &str = "copy_link";

static PRE_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<pre>([^<]+)</pre>").expect("valid regex"));

/// File details shown in a notification.
#[derive(Debug, Clone)]
pub struct FileNotice<'a> {
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub size_bytes: u64,
    pub file_id: &'a str,
    /// Absolute URL the file is served from
    pub url: &'a str,
}

/// Message text and keyboard ready for `sendMessage`.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub text: String,
    pub reply_markup: InlineKeyboardMarkup,
}

/// Human-readable size using binary multiples.
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    match bytes {
        b if b < KIB => format!("{b} B"),
        b if b < MIB => format!("{:.1} KB", b as f64 / KIB as f64),
        b if b < GIB => format!("{:.1} MB", b as f64 / MIB as f64),
        b => format!("{:.1} GB", b as f64 / GIB as f64),
    }
}

/// Icon for the file type.
pub fn file_icon(mime_type: &str) -> &'static str {
    const ARCHIVES: &[&str] = &[
        "application/zip",
        "application/x-zip-compressed",
        "application/x-rar-compressed",
        "application/vnd.rar",
        "application/x-7z-compressed",
        "application/x-tar",
        "application/gzip",
        "application/x-gzip",
        "application/x-bzip2",
        "application/x-xz",
    ];

    if mime_type.starts_with("image/") {
        "🖼️"
    } else if mime_type.starts_with("video/") {
        "🎬"
    } else if mime_type.starts_with("audio/") {
        "🎵"
    } else if mime_type == "application/pdf" {
        "📄"
    } else if ARCHIVES.contains(&mime_type) {
        "🗜️"
    } else {
        "📁"
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Build the message text and inline keyboard for an uploaded file.
pub fn build_notification(notice: &FileNotice<'_>) -> NotificationPayload {
    let url = escape_html(notice.url);
    let text = format!(
        "✅ <b>File uploaded</b>\n\n\
         {icon} <b>Name:</b> {name}\n\
         📦 <b>Size:</b> {size}\n\
         🆔 <b>File ID:</b> <code>{file_id}</code>\n\
         🔗 <b>Link:</b> <a href=\"{url}\">Open file</a>\n\n\
         <pre>{url}</pre>",
        icon = file_icon(notice.mime_type),
        name = escape_html(notice.file_name),
        size = format_size(notice.size_bytes),
        file_id = escape_html(notice.file_id),
    );

    let reply_markup = InlineKeyboardMarkup {
        inline_keyboard: vec![vec![
            InlineKeyboardButton::url("🔗 Direct access", notice.url),
            InlineKeyboardButton::callback("📋 Copy link", COPY_LINK_CALLBACK),
        ]],
    };

    NotificationPayload { text, reply_markup }
}

/// Post the upload notification. Returns without sending when notifications are disabled.
#[instrument(skip(client, config, notice), fields(file_id = notice.file_id))]
pub async fn send_upload_notification(
    client: &TelegramClient,
    config: &NotificationsConfig,
    chat_id: &ChatId,
    notice: &FileNotice<'_>,
) -> anyhow::Result<()> {
    if !config.enabled {
        debug!("Notifications disabled, skipping");
        return Ok(());
    }

    let payload = build_notification(notice);
    client.send_message(chat_id, &payload.text, Some(&payload.reply_markup)).await?;
    counter!("tgrelay_notifications_sent_total").increment(1);
    debug!(%chat_id, "Sent upload notification");
    Ok(())
}

/// Recover the file URL from a notification message.
///
/// Telegram delivers messages with formatting stripped and a list of entities, so the last
/// `pre` entity is preferred. Without one, the `<pre>` block of the composed HTML is matched.
pub fn extract_file_url(text: &str, entities: &[MessageEntity]) -> Option<String> {
    if let Some(entity) = entities.iter().rev().find(|e| e.kind == "pre") {
        // Entity offsets count UTF-16 code units
        let units: Vec<u16> = text.encode_utf16().collect();
        let end = entity.offset.checked_add(entity.length)?;
        if let Some(slice) = units.get(entity.offset..end)
            && let Ok(url) = String::from_utf16(slice)
        {
            let url = url.trim();
            if !url.is_empty() {
                return Some(url.to_string());
            }
        }
    }

    PRE_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape_html(m.as_str().trim()))
        .filter(|url| !url.is_empty())
}
