//! Application lifecycle: build the backends, the cache, the repository and
//! the state holders from a [`ClientConfig`], and tear them down again.

use std::sync::Arc;

use anyhow::Context;
use taskcomm_remote::memory::{MemoryAuth, MemoryBlobs, MemoryDocuments, MemoryRelational};
use taskcomm_remote::{DocStoreClient, RestClient, StorageClient};
use taskcomm_store::Database;
use tracing::{info, warn};

use crate::auth::AuthHolder;
use crate::chat::ChatHolder;
use crate::config::ClientConfig;
use crate::instructions::InstructionHolder;
use crate::repository::{Backends, Repository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Hosted services over HTTP.
    Hosted,
    /// In-process backends; nothing leaves the machine.
    Offline,
}

impl BackendMode {
    pub fn for_config(config: &ClientConfig) -> Self {
        if config.offline {
            Self::Offline
        } else if !config.has_remote() {
            warn!("no relational backend configured, running offline");
            Self::Offline
        } else {
            Self::Hosted
        }
    }
}

/// Everything a front end needs, constructed once at startup.
pub struct AppContext {
    pub config: ClientConfig,
    pub mode: BackendMode,
    pub auth: AuthHolder,
    pub instructions: InstructionHolder,
    pub chat: ChatHolder,
    repo: Arc<Repository>,
}

impl AppContext {
    pub fn start(config: ClientConfig) -> anyhow::Result<Self> {
        let mode = BackendMode::for_config(&config);
        let backends = match mode {
            BackendMode::Hosted => hosted_backends(&config),
            BackendMode::Offline => offline_backends(),
        };

        let cache = match &config.db_path {
            Some(path) => Database::open_at(path)
                .with_context(|| format!("opening cache at {}", path.display()))?,
            None => Database::new().context("opening default cache")?,
        };

        let repo = Arc::new(Repository::new(cache, backends, config.verify_delay));
        info!(mode = ?mode, poll_ms = config.poll_interval.as_millis() as u64, "client started");

        Ok(Self {
            auth: AuthHolder::new(repo.clone()),
            instructions: InstructionHolder::new(repo.clone()),
            chat: ChatHolder::new(repo.clone(), config.poll_interval),
            mode,
            config,
            repo,
        })
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Stop the open chat thread and release the backends.
    pub fn shutdown(self) {
        self.chat.close();
        info!("client stopped");
    }
}

fn hosted_backends(config: &ClientConfig) -> Backends {
    let rest = Arc::new(RestClient::new(&config.rest_url, config.anon_key.clone()));

    let documents: Arc<dyn taskcomm_remote::DocumentBackend> = if config.project_id.is_empty() {
        warn!("no document-store project configured, profiles stay local");
        Arc::new(MemoryDocuments::new())
    } else {
        Arc::new(DocStoreClient::new(
            &config.docs_url,
            &config.project_id,
            config.docs_api_key.clone(),
        ))
    };

    let blobs: Arc<dyn taskcomm_remote::BlobBackend> = if config.storage_bucket.is_empty() {
        warn!("no storage bucket configured, attachments stay local");
        Arc::new(MemoryBlobs::new())
    } else {
        Arc::new(StorageClient::new(
            &config.storage_url,
            config.storage_bucket.clone(),
        ))
    };

    Backends {
        relational: rest.clone(),
        auth: rest,
        documents,
        blobs,
    }
}

fn offline_backends() -> Backends {
    Backends {
        relational: Arc::new(MemoryRelational::new()),
        auth: Arc::new(MemoryAuth::default()),
        documents: Arc::new(MemoryDocuments::new()),
        blobs: Arc::new(MemoryBlobs::new()),
    }
}
