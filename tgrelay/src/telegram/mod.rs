//! Telegram Bot API integration.
//!
//! - [`client`]: outbound calls and the upload retry policy
//! - [`file_id`]: file id extraction from upload responses
//! - [`types`]: wire types and the upload classification

pub mod client;
pub mod file_id;
pub mod types;

pub use client::{MAX_RETRIES, SendOutcome, TelegramClient};
pub use file_id::extract_file_id;
pub use types::{FileKind, UploadedFile};
