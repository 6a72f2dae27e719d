//! The repository: one façade over the local cache and the remote backends.
//!
//! Authority per entity:
//!
//! | entity        | source of truth                                   |
//! |---------------|---------------------------------------------------|
//! | auth + role   | relational auth service and `profiles` table      |
//! | user profile  | document store, `users/{id}`                      |
//! | instruction   | relational `instructions` table                   |
//! | task          | relational `tasks` table; edits go to `tasks/{id}` |
//! | chat message  | relational `chat_messages` table                  |
//!
//! The cache mirrors whatever was last read or written.  Cache writes that
//! follow a successful remote call are best-effort: a failure is logged and
//! never turns the remote success into an error.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskcomm_remote::{AuthBackend, BlobBackend, DocumentBackend, RelationalBackend};
use taskcomm_store::Database;
use tracing::{info, warn};

use crate::error::{ClientError, Result};

mod auth;
mod diagnostics;
mod instructions;
mod messages;
mod profiles;
pub(crate) mod rows;
mod tasks;

/// The remote services the repository talks to.
#[derive(Clone)]
pub struct Backends {
    pub relational: Arc<dyn RelationalBackend>,
    pub auth: Arc<dyn AuthBackend>,
    pub documents: Arc<dyn DocumentBackend>,
    pub blobs: Arc<dyn BlobBackend>,
}

pub struct Repository {
    cache: Mutex<Database>,
    backends: Backends,
    verify_delay: Duration,
}

impl Repository {
    pub fn new(cache: Database, backends: Backends, verify_delay: Duration) -> Self {
        Self {
            cache: Mutex::new(cache),
            backends,
            verify_delay,
        }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Run `f` against the cache.  The lock is released before returning, so
    /// this is safe to call from async code as long as `f` does not await.
    fn with_cache<T>(
        &self,
        f: impl FnOnce(&mut Database) -> taskcomm_store::Result<T>,
    ) -> Result<T> {
        let mut db = self.cache.lock().map_err(|_| ClientError::CacheUnavailable)?;
        Ok(f(&mut db)?)
    }

    /// Best-effort cache write after a remote success.
    fn mirror<T>(&self, what: &str, f: impl FnOnce(&mut Database) -> taskcomm_store::Result<T>) {
        if let Err(e) = self.with_cache(f) {
            warn!(what, error = %e, "cache write failed");
        }
    }

    /// Wipe every cached record.  Called on sign-out.
    pub fn clear_local_data(&self) -> Result<()> {
        self.with_cache(|db| db.clear_all())?;
        info!("local data cleared");
        Ok(())
    }
}
