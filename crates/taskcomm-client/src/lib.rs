//! TaskComm client core.
//!
//! A front end builds an [`AppContext`] from a [`ClientConfig`] and drives the
//! three state holders it exposes: [`AuthHolder`], [`InstructionHolder`] and
//! [`ChatHolder`].  Each publishes its state over `tokio::sync::watch`.

pub mod app;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod instructions;
mod polling;
pub mod repository;

use tracing_subscriber::{fmt, EnvFilter};

pub use app::{AppContext, BackendMode};
pub use auth::{AuthHolder, AuthState};
pub use chat::{ChatHolder, ChatState};
pub use config::ClientConfig;
pub use error::{AuthError, ClientError, Result};
pub use instructions::{InstructionHolder, InstructionsState};
pub use repository::{Backends, Repository};

/// Install the global `tracing` subscriber.  `RUST_LOG` overrides the
/// default filter.  Calling this twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("taskcomm_client=debug,taskcomm_remote=debug,taskcomm_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
