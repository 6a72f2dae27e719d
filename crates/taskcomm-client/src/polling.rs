//! The chat polling loop.
//!
//! One loop per open thread.  Each iteration probes the table (debug only),
//! fetches the task's messages, reconciles them into the shared view and
//! notifies subscribers, then waits a fixed interval.  A failed fetch
//! re-publishes the current view unchanged.  The loop ends once every
//! subscriber has dropped its receiver, or when its handle is aborted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskcomm_shared::{reconcile, ChatMessage, MessageId, TaskId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::repository::Repository;

/// Messages deleted from the view.  Server rows with these ids are dropped
/// while a delete is in flight and after it has gone through, so a poll that
/// read the row before it disappeared cannot bring it back.
pub(crate) type Hidden = Arc<Mutex<HashSet<MessageId>>>;

fn hidden_ids(hidden: &Hidden) -> HashSet<MessageId> {
    match hidden.lock() {
        Ok(ids) => ids.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub(crate) fn spawn_poller(
    repo: Arc<Repository>,
    task_id: TaskId,
    view: Arc<watch::Sender<Vec<ChatMessage>>>,
    hidden: Hidden,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(task_id = %task_id, interval_ms = interval.as_millis() as u64, "polling started");
        loop {
            poll_once(&repo, &task_id, &view, &hidden).await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = view.closed() => break,
            }
        }
        info!(task_id = %task_id, "polling stopped");
    })
}

/// One fetch/reconcile/emit round.
pub(crate) async fn poll_once(
    repo: &Repository,
    task_id: &TaskId,
    view: &watch::Sender<Vec<ChatMessage>>,
    hidden: &Hidden,
) {
    match repo.probe_messages_table().await {
        Ok(rows) => debug!(rows, "table probe ok"),
        Err(e) => warn!(error = %e, "table probe failed"),
    }

    match repo.fetch_messages(task_id).await {
        // Reconcile against the view as it is now, not as it was when the
        // fetch started, so optimistic changes made meanwhile survive.
        Ok(mut server) => {
            let hidden = hidden_ids(hidden);
            if !hidden.is_empty() {
                server.retain(|m| !hidden.contains(&m.id));
            }
            view.send_modify(|local| *local = reconcile(local, &server));
        }
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "fetch failed, keeping last view");
            view.send_modify(|_| {});
        }
    }
}
