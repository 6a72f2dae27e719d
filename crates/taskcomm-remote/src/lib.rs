//! Backend adapters for the TaskComm client.
//!
//! Three remote services sit behind traits so the repository never touches an
//! HTTP client directly:
//!
//! - [`RelationalBackend`] + [`AuthBackend`]: table CRUD filtered by equality
//!   predicates, reached over a PostgREST-style HTTP API ([`RestClient`]).
//! - [`DocumentBackend`]: collection/document CRUD with live queries
//!   ([`DocStoreClient`]).
//! - [`BlobBackend`]: attachment upload returning a download URL
//!   ([`StorageClient`]).
//!
//! The [`memory`] module provides in-process implementations of all of them.

pub mod blob;
pub mod document;
pub mod docstore;
pub mod error;
pub mod memory;
pub mod query;
pub mod relational;
pub mod rest;

pub use blob::{BlobBackend, StorageClient};
pub use docstore::DocStoreClient;
pub use document::{listen, Document, DocumentBackend};
pub use error::{RemoteError, Result};
pub use query::{Direction, Query};
pub use relational::{AuthBackend, AuthUser, RelationalBackend, Session};
pub use rest::RestClient;
