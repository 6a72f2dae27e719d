//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client can start in offline mode with
//! zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use taskcomm_shared::constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_VERIFY_DELAY_MS};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the relational backend (tables and auth).
    /// Env: `TASKCOMM_REST_URL`
    pub rest_url: String,

    /// API key sent with every relational request.
    /// Env: `TASKCOMM_ANON_KEY`
    pub anon_key: String,

    /// Document store REST base URL.
    /// Env: `TASKCOMM_DOCS_URL`
    /// Default: `https://firestore.googleapis.com/v1`
    pub docs_url: String,

    /// Env: `TASKCOMM_PROJECT_ID`
    pub project_id: String,

    /// Env: `TASKCOMM_DOCS_API_KEY`
    pub docs_api_key: Option<String>,

    /// Blob storage base URL.
    /// Env: `TASKCOMM_STORAGE_URL`
    /// Default: `https://firebasestorage.googleapis.com/v0`
    pub storage_url: String,

    /// Env: `TASKCOMM_STORAGE_BUCKET`
    pub storage_bucket: String,

    /// Cache database file.  `None` uses the platform data directory.
    /// Env: `TASKCOMM_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Delay between chat polls.
    /// Env: `TASKCOMM_POLL_INTERVAL_MS`
    /// Default: 1500 ms
    pub poll_interval: Duration,

    /// Wait between a remote edit/delete and its verification re-read.
    /// Env: `TASKCOMM_VERIFY_DELAY_MS`
    /// Default: 200 ms
    pub verify_delay: Duration,

    /// Run against in-process backends instead of the hosted services.
    /// Env: `TASKCOMM_OFFLINE` (true/false)
    /// Default: `false`
    pub offline: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rest_url: String::new(),
            anon_key: String::new(),
            docs_url: "https://firestore.googleapis.com/v1".to_string(),
            project_id: String::new(),
            docs_api_key: None,
            storage_url: "https://firebasestorage.googleapis.com/v0".to_string(),
            storage_bucket: String::new(),
            db_path: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            verify_delay: Duration::from_millis(DEFAULT_VERIFY_DELAY_MS),
            offline: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("TASKCOMM_REST_URL") {
            config.rest_url = url;
        }

        if let Some(key) = lookup("TASKCOMM_ANON_KEY") {
            config.anon_key = key;
        }

        if let Some(url) = lookup("TASKCOMM_DOCS_URL") {
            config.docs_url = url;
        }

        if let Some(project) = lookup("TASKCOMM_PROJECT_ID") {
            config.project_id = project;
        }

        if let Some(key) = lookup("TASKCOMM_DOCS_API_KEY") {
            if !key.is_empty() {
                config.docs_api_key = Some(key);
            }
        }

        if let Some(url) = lookup("TASKCOMM_STORAGE_URL") {
            config.storage_url = url;
        }

        if let Some(bucket) = lookup("TASKCOMM_STORAGE_BUCKET") {
            config.storage_bucket = bucket;
        }

        if let Some(path) = lookup("TASKCOMM_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("TASKCOMM_POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid TASKCOMM_POLL_INTERVAL_MS, using default"),
            }
        }

        if let Some(val) = lookup("TASKCOMM_VERIFY_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.verify_delay = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %val, "Invalid TASKCOMM_VERIFY_DELAY_MS, using default"),
            }
        }

        if let Some(val) = lookup("TASKCOMM_OFFLINE") {
            config.offline = val == "true" || val == "1";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Whether enough is configured to reach the hosted services.
    pub fn has_remote(&self) -> bool {
        !self.rest_url.is_empty() && !self.anon_key.is_empty()
    }
}
