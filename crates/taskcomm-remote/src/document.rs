//! Document store backend: collections of JSON documents keyed by id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::query::Query;

/// A stored document.  `fields` is always a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Fetch one document, `None` when it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or overwrite the document at `collection/id`.
    async fn set(&self, collection: &str, id: &str, fields: Value) -> Result<()>;

    /// Create a document with a backend-generated id and return that id.
    async fn add(&self, collection: &str, fields: Value) -> Result<String>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;
}

/// Live query over a collection.
///
/// A background task re-runs `query` every `interval` and pushes a snapshot
/// whenever the result set differs from the last one sent (the first
/// snapshot is always sent).  A failed query is forwarded once and ends the
/// listener; dropping the receiver ends it at the next tick.
pub fn listen(
    backend: Arc<dyn DocumentBackend>,
    collection: impl Into<String>,
    query: Query,
    interval: Duration,
) -> mpsc::Receiver<Result<Vec<Document>>> {
    let collection = collection.into();
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut last: Option<Vec<Document>> = None;
        loop {
            match backend.query(&collection, &query).await {
                Ok(docs) => {
                    if last.as_ref() != Some(&docs) {
                        debug!(collection = %collection, count = docs.len(), "snapshot changed");
                        if tx.send(Ok(docs.clone())).await.is_err() {
                            break;
                        }
                        last = Some(docs);
                    }
                }
                Err(e) => {
                    warn!(collection = %collection, error = %e, "live query failed");
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tx.closed() => break,
            }
        }
        debug!(collection = %collection, "listener stopped");
    });

    rx
}
