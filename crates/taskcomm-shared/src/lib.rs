//! # taskcomm-shared
//!
//! Domain types shared by every TaskComm crate: entity models, identity
//! newtypes, status enums, and the chat reconciliation routine that merges a
//! locally held message view with a freshly fetched server view.

pub mod constants;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod types;

pub use error::ModelError;
pub use models::*;
pub use reconcile::reconcile;
pub use types::*;
