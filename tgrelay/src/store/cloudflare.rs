//! Cloudflare Workers KV backend.
//!
//! Writes go to `PUT /accounts/{account}/storage/kv/namespaces/{ns}/values/{key}` as multipart
//! with an empty `value` and the record as `metadata`. Reads use the `metadata/{key}` endpoint.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::Form;
use serde::Deserialize;
use url::Url;

use super::{FileRecord, MetadataStore};

#[derive(Debug, Deserialize)]
struct CloudflareResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CloudflareError {
    code: i64,
    message: String,
}

fn describe(errors: &[CloudflareError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct CloudflareKvStore {
    client: reqwest::Client,
    base_url: Url,
    account_id: String,
    namespace_id: String,
    api_token: String,
}

impl CloudflareKvStore {
    pub fn new(base_url: Url, account_id: &str, namespace_id: &str, api_token: &str) -> anyhow::Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Cloudflare API URL {base_url} cannot be a base"));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create Cloudflare HTTP client")?;

        Ok(Self {
            client,
            base_url,
            account_id: account_id.to_string(),
            namespace_id: namespace_id.to_string(),
            api_token: api_token.to_string(),
        })
    }

    /// `{base}/accounts/{account}/storage/kv/namespaces/{ns}/{endpoint}/{key}`, with the key
    /// percent-encoded as a single path segment.
    fn kv_url(&self, endpoint: &str, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "accounts",
                &self.account_id,
                "storage",
                "kv",
                "namespaces",
                &self.namespace_id,
                endpoint,
                key,
            ]);
        }
        url
    }
}

#[async_trait]
impl MetadataStore for CloudflareKvStore {
    async fn put(&self, key: &str, record: &FileRecord) -> anyhow::Result<()> {
        let metadata = serde_json::to_string(record)?;
        let form = Form::new().text("value", "").text("metadata", metadata);

        let response = self
            .client
            .put(self.kv_url("values", key))
            .bearer_auth(&self.api_token)
            .multipart(form)
            .send()
            .await
            .context("Cloudflare KV write failed")?;

        let status = response.status();
        let body: CloudflareResponse<serde_json::Value> =
            response.json().await.context("Cloudflare KV write returned an unreadable body")?;

        if !status.is_success() || !body.success {
            return Err(anyhow!("Cloudflare KV write failed ({status}): {}", describe(&body.errors)));
        }

        tracing::debug!(key, "Stored file record in Cloudflare KV");
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<FileRecord>> {
        let response = self
            .client
            .get(self.kv_url("metadata", key))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .context("Cloudflare KV read failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        let body: CloudflareResponse<FileRecord> =
            response.json().await.context("Cloudflare KV read returned an unreadable body")?;

        if !status.is_success() || !body.success {
            return Err(anyhow!("Cloudflare KV read failed ({status}): {}", describe(&body.errors)));
        }

        Ok(body.result)
    }
}
