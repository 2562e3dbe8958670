// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the offline engine.
//!
//! # Example
//!
//! ```
//! use ward_sync::EngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = EngineConfig::default();
//! assert_eq!(config.max_retries, 5);
//! assert_eq!(config.namespace("data"), "ward-sync-data-v1");
//!
//! // Pointing at a tabular data host
//! let config = EngineConfig {
//!     data_host: Some("abc.supabase.co".into()),
//!     cache_version: "v2".into(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid app origin '{0}'")]
    InvalidOrigin(String),
    #[error("Queue namespace '{namespace}' starts with cache prefix '{prefix}' and would be deleted on activation")]
    QueueNamespaceCollision { namespace: String, prefix: String },
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Configuration for the offline engine.
///
/// All fields have defaults. Production hosts normally set `app_origin`,
/// `data_host` and `storage_path`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Origin the app shell is served from (e.g. "https://ward.example.org")
    #[serde(default = "default_app_origin")]
    pub app_origin: String,

    /// Prefix carried by every cache namespace this engine owns
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Bumped on deploy; old namespaces are deleted on activation
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Shell resources fetched on install (paths relative to `app_origin`)
    #[serde(default = "default_precache_paths")]
    pub precache_paths: Vec<String>,

    /// Shell document served when a navigation cannot reach the network
    #[serde(default = "default_shell_path")]
    pub shell_path: String,

    /// Host of the remote tabular data store (e.g. "abc.supabase.co")
    #[serde(default)]
    pub data_host: Option<String>,

    /// Path prefix of cacheable table reads on `data_host`
    #[serde(default = "default_data_path_prefix")]
    pub data_path_prefix: String,

    /// Path prefix of the realtime/streaming endpoint on `data_host`
    #[serde(default = "default_realtime_path_prefix")]
    pub realtime_path_prefix: String,

    /// Hosts serving long-lived fonts
    #[serde(default = "default_font_hosts")]
    pub font_hosts: Vec<String>,

    /// Extensions treated as immutable build assets
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,

    /// Ceiling for the data namespace, enforced by the cleanup operation
    #[serde(default = "default_data_cache_max_entries")]
    pub data_cache_max_entries: usize,

    /// Namespace holding the mutation queue. Must NOT start with `cache_prefix`.
    #[serde(default = "default_queue_namespace")]
    pub queue_namespace: String,

    /// Failed replays before a mutation is discarded
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Payload field identifying the row for `update` mutations
    #[serde(default = "default_update_key_field")]
    pub update_key_field: String,

    /// Periodic background sync interval in seconds (0 = disabled)
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// PBKDF2 iterations (values under 100_000 are raised)
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// PBKDF2 salt
    #[serde(default = "default_kdf_salt")]
    pub kdf_salt: String,

    /// SQLite file for durable local state (None = in-memory)
    #[serde(default)]
    pub storage_path: Option<String>,

    /// Capacity of the outbound client message channel
    #[serde(default = "default_client_channel_capacity")]
    pub client_channel_capacity: usize,
}

fn default_app_origin() -> String { "http://localhost".to_string() }
fn default_cache_prefix() -> String { "ward-sync".to_string() }
fn default_cache_version() -> String { "v1".to_string() }
fn default_precache_paths() -> Vec<String> {
    ["/", "/index.html", "/manifest.json", "/icons/icon-192.png"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_shell_path() -> String { "/index.html".to_string() }
fn default_data_path_prefix() -> String { "/rest/v1/".to_string() }
fn default_realtime_path_prefix() -> String { "/realtime/".to_string() }
fn default_font_hosts() -> Vec<String> {
    vec!["fonts.googleapis.com".to_string(), "fonts.gstatic.com".to_string()]
}
fn default_static_extensions() -> Vec<String> {
    ["js", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "otf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_data_cache_max_entries() -> usize { 100 }
fn default_queue_namespace() -> String { "offline-queue".to_string() }
fn default_max_retries() -> u32 { 5 }
fn default_update_key_field() -> String { "id".to_string() }
fn default_sync_interval_secs() -> u64 { 15 * 60 }
fn default_kdf_iterations() -> u32 { crate::crypto::MIN_KDF_ITERATIONS }
fn default_kdf_salt() -> String { crate::crypto::DEFAULT_KDF_SALT.to_string() }
fn default_client_channel_capacity() -> usize { 64 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_origin: default_app_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            precache_paths: default_precache_paths(),
            shell_path: default_shell_path(),
            data_host: None,
            data_path_prefix: default_data_path_prefix(),
            realtime_path_prefix: default_realtime_path_prefix(),
            font_hosts: default_font_hosts(),
            static_extensions: default_static_extensions(),
            data_cache_max_entries: default_data_cache_max_entries(),
            queue_namespace: default_queue_namespace(),
            max_retries: default_max_retries(),
            update_key_field: default_update_key_field(),
            sync_interval_secs: default_sync_interval_secs(),
            kdf_iterations: default_kdf_iterations(),
            kdf_salt: default_kdf_salt(),
            storage_path: None,
            client_channel_capacity: default_client_channel_capacity(),
        }
    }
}

impl EngineConfig {
    /// Versioned namespace name for a cache kind (`static`, `fonts`, `runtime`, `data`).
    #[must_use]
    pub fn namespace(&self, kind: &str) -> String {
        format!("{}-{}-{}", self.cache_prefix, kind, self.cache_version)
    }

    pub fn origin_url(&self) -> Result<reqwest::Url, ConfigError> {
        reqwest::Url::parse(&self.app_origin)
            .map_err(|_| ConfigError::InvalidOrigin(self.app_origin.clone()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;
        if self.cache_prefix.is_empty() {
            return Err(ConfigError::Invalid("cache_prefix must not be empty".into()));
        }
        if self.queue_namespace.starts_with(&self.cache_prefix) {
            return Err(ConfigError::QueueNamespaceCollision {
                namespace: self.queue_namespace.clone(),
                prefix: self.cache_prefix.clone(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.client_channel_capacity == 0 {
            return Err(ConfigError::Invalid("client_channel_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
