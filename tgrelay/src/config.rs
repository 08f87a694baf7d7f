//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `TGRELAY_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `TGRELAY_` override YAML values
//! 3. **TG_BOT_TOKEN / TG_CHAT_ID** - Special case: override `telegram.bot_token` and
//!    `telegram.chat_id` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `TGRELAY_TELEGRAM__NOTIFICATION_CHAT_ID=-100123` sets `telegram.notification_chat_id`.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `public_url`, `max_upload_size`
//! - **Telegram**: `telegram.bot_token`, `telegram.chat_id`, retry and timeout settings
//! - **Notifications**: `notifications.enabled` - post a message after each upload
//! - **Metadata store**: `metadata_store.type` - `none`, `memory` or `cloudflare_kv`
//! - **Features**: `enable_metrics`, `enable_otel_export`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! TG_BOT_TOKEN="123456:ABC-DEF"
//! TG_CHAT_ID=-1001234567890
//! TGRELAY_PORT=8080
//! TGRELAY_NOTIFICATIONS__ENABLED=false
//! TGRELAY_METADATA_STORE__TYPE=memory
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "TGRELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults, so a config file only needs the Telegram credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Public origin used for absolute file links in notifications (e.g. "https://img.example.com").
    /// When unset, the origin is derived from the `Host` and `X-Forwarded-Proto` request headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<Url>,
    /// Maximum accepted multipart body size in bytes
    pub max_upload_size: usize,
    /// Telegram Bot API settings
    pub telegram: TelegramConfig,
    /// Upload notification settings
    pub notifications: NotificationsConfig,
    /// Optional key-value store for upload bookkeeping
    pub metadata_store: MetadataStoreConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            public_url: None,
            // Bot API upload limit
            max_upload_size: 50 * 1024 * 1024,
            telegram: TelegramConfig::default(),
            notifications: NotificationsConfig::default(),
            metadata_store: MetadataStoreConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

/// Telegram chat identifier: either a numeric id or an `@channelusername`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{id}"),
            ChatId::Username(name) => f.write_str(name),
        }
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot token issued by @BotFather
    pub bot_token: String,
    /// Chat that uploaded files are sent to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    /// Chat for upload notifications (defaults to `chat_id`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_chat_id: Option<ChatId>,
    /// Bot API base URL
    pub api_base_url: Url,
    /// Timeout applied to every outbound Bot API request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Base delay between retries after a transport failure. The n-th retry waits n times this.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: None,
            notification_chat_id: None,
            api_base_url: "https://api.telegram.org".parse().expect("Invalid default Telegram URL"),
            request_timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_millis(1000),
        }
    }
}

/// Upload notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationsConfig {
    /// Post a message with file details and buttons after each upload (default: true)
    pub enabled: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Metadata store backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataStoreConfig {
    /// No bookkeeping
    #[default]
    None,
    /// Process-local map, lost on restart
    Memory,
    /// Cloudflare Workers KV namespace, written through the Cloudflare REST API
    CloudflareKv {
        account_id: String,
        namespace_id: String,
        api_token: String,
        #[serde(default = "MetadataStoreConfig::default_cloudflare_api_url")]
        api_base_url: Url,
    },
}

impl MetadataStoreConfig {
    fn default_cloudflare_api_url() -> Url {
        "https://api.cloudflare.com/client/v4/"
            .parse()
            .expect("Invalid default Cloudflare URL")
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: telegram.bot_token is not configured. \
                     Please set TG_BOT_TOKEN environment variable or add telegram.bot_token to config file."
                    .to_string(),
            });
        }

        match &self.telegram.chat_id {
            None => {
                return Err(Error::Internal {
                    operation: "Config validation: telegram.chat_id is not configured. \
                         Please set TG_CHAT_ID environment variable or add telegram.chat_id to config file."
                        .to_string(),
                });
            }
            Some(ChatId::Username(name)) if name.trim().is_empty() => {
                return Err(Error::Internal {
                    operation: "Config validation: telegram.chat_id cannot be empty".to_string(),
                });
            }
            Some(_) => {}
        }

        if self.max_upload_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: max_upload_size cannot be 0".to_string(),
            });
        }

        if self.telegram.request_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: telegram.request_timeout cannot be 0".to_string(),
            });
        }

        if let MetadataStoreConfig::CloudflareKv {
            account_id,
            namespace_id,
            api_token,
            ..
        } = &self.metadata_store
            && (account_id.is_empty() || namespace_id.is_empty() || api_token.is_empty())
        {
            return Err(Error::Internal {
                operation: "Config validation: cloudflare_kv metadata store requires account_id, namespace_id and api_token"
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("TGRELAY_").ignore(&["config"]).split("__"))
            // Plain variable names used by existing deployments
            .merge(Env::raw().only(&["TG_BOT_TOKEN"]).map(|_| "telegram.bot_token".into()))
            .merge(Env::raw().only(&["TG_CHAT_ID"]).map(|_| "telegram.chat_id".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Chat that receives upload notifications
    pub fn notification_chat_id(&self) -> Option<&ChatId> {
        self.telegram.notification_chat_id.as_ref().or(self.telegram.chat_id.as_ref())
    }
}
