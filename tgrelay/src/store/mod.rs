//! Key-value bookkeeping for uploaded files.
//!
//! Records are keyed by `"{file_id}.{extension}"`, the same name the file is served under. The
//! value itself is empty; everything lives in the JSON metadata, whose field names match what
//! existing admin tooling reads from the KV namespace.
//!
//! - [`memory::MemoryStore`]: process-local, for development and tests
//! - [`cloudflare::CloudflareKvStore`]: Cloudflare Workers KV via the REST API

pub mod cloudflare;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MetadataStoreConfig;
use crate::telegram::UploadedFile;

pub use cloudflare::CloudflareKvStore;
pub use memory::MemoryStore;

/// Moderation list a file belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListType {
    #[default]
    None,
    White,
    Block,
}

/// Metadata recorded once per successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Upload time in epoch milliseconds
    #[serde(rename = "TimeStamp")]
    pub timestamp: i64,
    #[serde(rename = "ListType", default)]
    pub list_type: ListType,
    #[serde(rename = "Label", default = "FileRecord::default_label")]
    pub label: String,
    #[serde(default)]
    pub liked: bool,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
    #[serde(rename = "fileType", default)]
    pub file_type: String,
    #[serde(rename = "uploadedAt", default = "Utc::now")]
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(file: &UploadedFile, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now.timestamp_millis(),
            list_type: ListType::None,
            label: Self::default_label(),
            liked: false,
            file_name: file.name.clone(),
            file_size: file.size_bytes,
            file_type: file.mime_type.clone(),
            uploaded_at: now,
        }
    }

    fn default_label() -> String {
        "None".to_string()
    }

    pub fn is_blocked(&self) -> bool {
        self.list_type == ListType::Block
    }
}

/// A key-value store holding one [`FileRecord`] per uploaded file.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put(&self, key: &str, record: &FileRecord) -> anyhow::Result<()>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<FileRecord>>;
}

/// Build the configured store, if any.
pub fn from_config(config: &MetadataStoreConfig) -> anyhow::Result<Option<Arc<dyn MetadataStore>>> {
    let store: Option<Arc<dyn MetadataStore>> = match config {
        MetadataStoreConfig::None => None,
        MetadataStoreConfig::Memory => Some(Arc::new(MemoryStore::default())),
        MetadataStoreConfig::CloudflareKv {
            account_id,
            namespace_id,
            api_token,
            api_base_url,
        } => Some(Arc::new(CloudflareKvStore::new(
            api_base_url.clone(),
            account_id,
            namespace_id,
            api_token,
        )?)),
    };
    Ok(store)
}
