//! # taskcomm-store
//!
//! On-device cache for the TaskComm client, backed by SQLite.
//!
//! The cache mirrors four entity kinds (profiles, instructions, tasks and chat
//! messages) with point lookups by primary key and range lookups by parent
//! id.  It is a best-effort copy of remote state: every write is a
//! last-write-wins upsert and nothing here is treated as a source of truth.

pub mod database;
pub mod instructions;
pub mod messages;
pub mod migrations;
pub mod profiles;
pub mod tasks;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
