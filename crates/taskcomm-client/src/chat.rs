//! Chat thread state holder.
//!
//! Owns the in-memory message view of the open thread.  Sends, edits and
//! deletes are applied to the view first and rolled back if the remote write
//! (or its verification) fails.  The polling loop reconciles server rows into
//! the same view in the background.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use taskcomm_shared::{
    mark_edited, ChatMessage, MessageId, OutgoingMessage, Role, TaskId, UserId,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::polling::{spawn_poller, Hidden};
use crate::repository::Repository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Loading,
    Ready,
    Error(String),
}

struct OpenThread {
    task_id: TaskId,
    poller: JoinHandle<()>,
}

pub struct ChatHolder {
    repo: Arc<Repository>,
    poll_interval: Duration,
    view: Arc<watch::Sender<Vec<ChatMessage>>>,
    state: watch::Sender<ChatState>,
    thread: Mutex<Option<OpenThread>>,
    hidden: Hidden,
}

impl ChatHolder {
    pub fn new(repo: Arc<Repository>, poll_interval: Duration) -> Self {
        let (view, _) = watch::channel(Vec::new());
        let (state, _) = watch::channel(ChatState::Idle);
        Self {
            repo,
            poll_interval,
            view: Arc::new(view),
            state,
            thread: Mutex::new(None),
            hidden: Hidden::default(),
        }
    }

    /// Open the thread of `task_id`, replacing any open thread.  The view is
    /// seeded from the cache and then kept fresh by the polling loop until
    /// every returned receiver is dropped or [`close`](Self::close) is called.
    pub fn open(&self, task_id: TaskId) -> watch::Receiver<Vec<ChatMessage>> {
        self.close();
        self.state.send_replace(ChatState::Loading);

        let seeded = self.repo.cached_messages(&task_id).unwrap_or_else(|e| {
            warn!(task_id = %task_id, error = %e, "cache read failed, starting empty");
            Vec::new()
        });
        debug!(task_id = %task_id, cached = seeded.len(), "chat view seeded");
        self.view.send_replace(seeded);
        self.set_hidden(|ids| ids.clear());

        // Subscribe before spawning so the loop never sees zero receivers.
        let rx = self.view.subscribe();
        let poller = spawn_poller(
            self.repo.clone(),
            task_id.clone(),
            self.view.clone(),
            self.hidden.clone(),
            self.poll_interval,
        );
        if let Ok(mut slot) = self.thread.lock() {
            *slot = Some(OpenThread { task_id, poller });
        }
        self.state.send_replace(ChatState::Ready);
        rx
    }

    /// Stop polling the open thread.  The last view stays readable.
    pub fn close(&self) {
        let previous = self.thread.lock().ok().and_then(|mut slot| slot.take());
        if let Some(thread) = previous {
            thread.poller.abort();
            info!(task_id = %thread.task_id, "chat closed");
            self.state.send_replace(ChatState::Idle);
        }
    }

    pub fn open_task(&self) -> Option<TaskId> {
        self.thread
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|t| t.task_id.clone()))
    }

    pub fn messages(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub async fn send_text(
        &self,
        sender_id: UserId,
        sender_role: Role,
        text: impl Into<String>,
    ) -> Result<ChatMessage> {
        let task_id = self.require_open()?;
        let outgoing = OutgoingMessage::text(task_id, sender_id, sender_role, text);
        let placeholder = self.push_placeholder(&outgoing);

        let sent = self.repo.send_message(&outgoing).await;
        self.settle_send(&placeholder, sent)
    }

    /// Upload an attachment and send it as a message.  The placeholder shows
    /// `File: <name>` until the upload and the insert both succeed.
    pub async fn send_file(
        &self,
        sender_id: UserId,
        sender_role: Role,
        file_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<ChatMessage> {
        let task_id = self.require_open()?;
        let mut outgoing = OutgoingMessage::attachment(
            task_id,
            sender_id,
            sender_role,
            file_name,
            data.len(),
            content_type,
        );
        let placeholder = self.push_placeholder(&outgoing);

        let sent = async {
            let url = self
                .repo
                .upload_attachment(file_name, data, content_type)
                .await?;
            outgoing.media_url = Some(url);
            self.repo.send_message(&outgoing).await
        }
        .await;
        self.settle_send(&placeholder, sent)
    }

    /// Replace a message's text, showing the edit immediately.  On failure
    /// the message reverts to the text it had before.
    pub async fn edit(&self, id: &MessageId, new_text: &str) -> Result<ChatMessage> {
        if let Err(e) = id.require_confirmed() {
            return Err(self.fail(e.into()));
        }
        let Some(before) = self.find(id) else {
            return Err(self.fail(ClientError::NotFound(format!("message {id}"))));
        };

        let marked = mark_edited(new_text);
        self.view.send_modify(|view| {
            if let Some(m) = view.iter_mut().find(|m| &m.id == id) {
                m.text = marked.clone();
            }
        });

        match self.repo.edit_message(id, new_text).await {
            Ok(updated) => {
                self.view.send_modify(|view| {
                    if let Some(m) = view.iter_mut().find(|m| m.id == updated.id) {
                        *m = updated.clone();
                    }
                });
                Ok(updated)
            }
            Err(e) => {
                warn!(message_id = %id, error = %e, "edit failed, reverting");
                self.view.send_modify(|view| {
                    if let Some(m) = view.iter_mut().find(|m| &m.id == id) {
                        m.text = before.text.clone();
                    }
                });
                Err(self.fail(e))
            }
        }
    }

    /// Remove a message, hiding it immediately.  On failure it reappears.
    /// Polls that run while the delete is in flight do not bring it back.
    pub async fn delete(&self, id: &MessageId) -> Result<()> {
        if let Err(e) = id.require_confirmed() {
            return Err(self.fail(e.into()));
        }
        let Some(removed) = self.find(id) else {
            return Err(self.fail(ClientError::NotFound(format!("message {id}"))));
        };
        self.set_hidden(|ids| {
            ids.insert(id.clone());
        });
        self.view.send_modify(|view| view.retain(|m| &m.id != id));

        match self.repo.delete_message(id).await {
            Ok(()) => {
                self.view.send_modify(|view| view.retain(|m| &m.id != id));
                Ok(())
            }
            Err(e) => {
                warn!(message_id = %id, error = %e, "delete failed, restoring");
                self.set_hidden(|ids| {
                    ids.remove(id);
                });
                self.view.send_modify(|view| {
                    if !view.iter().any(|m| m.id == removed.id) {
                        insert_ordered(view, removed);
                    }
                });
                Err(self.fail(e))
            }
        }
    }

    /// Acknowledge an error.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, ChatState::Error(_)) {
                *state = ChatState::Idle;
                true
            } else {
                false
            }
        });
    }

    fn require_open(&self) -> Result<TaskId> {
        self.open_task().ok_or(ClientError::NoOpenThread)
    }

    fn set_hidden(&self, change: impl FnOnce(&mut HashSet<MessageId>)) {
        match self.hidden.lock() {
            Ok(mut ids) => change(&mut ids),
            Err(poisoned) => change(&mut poisoned.into_inner()),
        }
    }

    fn find(&self, id: &MessageId) -> Option<ChatMessage> {
        self.view.borrow().iter().find(|m| &m.id == id).cloned()
    }

    fn push_placeholder(&self, outgoing: &OutgoingMessage) -> ChatMessage {
        let placeholder = ChatMessage::placeholder(outgoing);
        self.view
            .send_modify(|view| insert_ordered(view, placeholder.clone()));
        placeholder
    }

    fn settle_send(
        &self,
        placeholder: &ChatMessage,
        sent: Result<ChatMessage>,
    ) -> Result<ChatMessage> {
        match sent {
            Ok(confirmed) => {
                self.view.send_modify(|view| {
                    view.retain(|m| m.id != placeholder.id);
                    // A poll may already have delivered the confirmed row.
                    if !view.iter().any(|m| m.id == confirmed.id) {
                        insert_ordered(view, confirmed.clone());
                    }
                });
                Ok(confirmed)
            }
            Err(e) => {
                warn!(placeholder = %placeholder.id, error = %e, "send failed, removing placeholder");
                self.view
                    .send_modify(|view| view.retain(|m| m.id != placeholder.id));
                Err(self.fail(e))
            }
        }
    }

    fn fail(&self, error: ClientError) -> ClientError {
        self.state.send_replace(ChatState::Error(error.to_string()));
        error
    }
}

impl Drop for ChatHolder {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.thread.lock() {
            if let Some(thread) = slot.take() {
                thread.poller.abort();
            }
        }
    }
}

/// Insert keeping the view ascending by timestamp; ties go after existing
/// entries.
fn insert_ordered(view: &mut Vec<ChatMessage>, message: ChatMessage) {
    let at = view.partition_point(|m| m.timestamp <= message.timestamp);
    view.insert(at, message);
}

#[cfg(test)]
mod tests {
    use taskcomm_shared::constants::TABLE_CHAT_MESSAGES;
    use taskcomm_shared::FileType;

    use super::*;
    use crate::repository::test_support::{harness, Harness};

    const SLOW_POLL: Duration = Duration::from_secs(3600);
    const FAST_POLL: Duration = Duration::from_millis(5);
    const WRITE_DELAY: Duration = Duration::from_millis(50);

    fn holder(h: &Harness) -> ChatHolder {
        ChatHolder::new(h.repo.clone(), SLOW_POLL)
    }

    /// Open `t1` and let the first poll run to completion.
    async fn opened(chat: &ChatHolder) -> watch::Receiver<Vec<ChatMessage>> {
        let rx = chat.open(TaskId::new("t1"));
        tokio::task::yield_now().await;
        rx
    }

    async fn seeded(h: &Harness, text: &str) -> ChatMessage {
        let out = OutgoingMessage::text(TaskId::new("t1"), UserId::new("u1"), Role::User, text);
        h.repo.send_message(&out).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_seeds_from_cache() {
        let h = harness();
        seeded(&h, "cached").await;
        let chat = holder(&h);

        let rx = chat.open(TaskId::new("t1"));
        assert_eq!(rx.borrow()[0].text, "cached");
        assert_eq!(chat.current_state(), ChatState::Ready);
        assert_eq!(chat.open_task(), Some(TaskId::new("t1")));

        chat.close();
        assert_eq!(chat.current_state(), ChatState::Idle);
        assert_eq!(chat.open_task(), None);
    }

    #[tokio::test]
    async fn test_send_without_open_thread_fails() {
        let h = harness();
        let chat = holder(&h);
        let err = chat
            .send_text(UserId::new("u1"), Role::User, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoOpenThread));
    }

    #[tokio::test]
    async fn test_send_replaces_placeholder_with_confirmed_row() {
        let h = harness();
        let chat = holder(&h);
        let _rx = opened(&chat).await;

        let sent = chat
            .send_text(UserId::new("u1"), Role::User, "hello")
            .await
            .unwrap();
        let view = chat.snapshot();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, sent.id);
        assert!(!view[0].id.is_pending());
    }

    #[tokio::test]
    async fn test_send_failure_removes_placeholder() {
        let h = harness();
        let chat = holder(&h);
        let _rx = opened(&chat).await;
        h.relational.set_fail_writes(true);

        let err = chat.send_text(UserId::new("u1"), Role::User, "lost").await;
        assert!(err.is_err());
        assert!(chat.snapshot().is_empty());
        assert!(matches!(chat.current_state(), ChatState::Error(_)));

        chat.clear_error();
        assert_eq!(chat.current_state(), ChatState::Idle);
    }

    #[tokio::test]
    async fn test_send_file_uploads_then_sends() {
        let h = harness();
        let chat = holder(&h);
        let _rx = opened(&chat).await;

        let sent = chat
            .send_file(
                UserId::new("u1"),
                Role::User,
                "site.png",
                Bytes::from_static(b"\x89PNG"),
                "image/png",
            )
            .await
            .unwrap();
        assert_eq!(sent.file_type, FileType::Image);
        assert_eq!(sent.text, "File: site.png");
        assert!(sent.media_url.is_some());
        assert_eq!(sent.file_size, Some(4));
        assert!(h.blobs.object("uploads/site.png").is_some());
    }

    #[tokio::test]
    async fn test_send_file_upload_failure_rolls_back() {
        let h = harness();
        let chat = holder(&h);
        let _rx = opened(&chat).await;
        h.blobs.set_failing(true);

        let result = chat
            .send_file(
                UserId::new("u1"),
                Role::User,
                "plan.pdf",
                Bytes::from_static(b"%PDF"),
                "application/pdf",
            )
            .await;
        assert!(result.is_err());
        assert!(chat.snapshot().is_empty());
        assert!(h.relational.rows(TABLE_CHAT_MESSAGES).is_empty());
    }

    #[tokio::test]
    async fn test_edit_applies_marker() {
        let h = harness();
        let msg = seeded(&h, "hello").await;
        let chat = holder(&h);
        let _rx = opened(&chat).await;

        chat.edit(&msg.id, "hello all").await.unwrap();
        assert_eq!(chat.snapshot()[0].text, "hello all (edited)");
    }

    #[tokio::test]
    async fn test_edit_failure_reverts_text() {
        let h = harness();
        let msg = seeded(&h, "hello").await;
        let chat = holder(&h);
        let _rx = opened(&chat).await;
        h.relational.set_fail_writes(true);

        let err = chat.edit(&msg.id, "changed").await;
        assert!(err.is_err());
        assert_eq!(chat.snapshot()[0].text, "hello");
        assert!(matches!(chat.current_state(), ChatState::Error(_)));
    }

    #[tokio::test]
    async fn test_edit_ignored_by_backend_reverts_text() {
        let h = harness();
        let msg = seeded(&h, "hello").await;
        let chat = holder(&h);
        let _rx = opened(&chat).await;
        h.relational.set_ignore_updates(true);

        let err = chat.edit(&msg.id, "changed").await.unwrap_err();
        assert!(matches!(err, ClientError::Verification(_)));
        assert_eq!(chat.snapshot()[0].text, "hello");
    }

    #[tokio::test]
    async fn test_delete_removes_message() {
        let h = harness();
        let msg = seeded(&h, "bye").await;
        let chat = holder(&h);
        let _rx = opened(&chat).await;

        chat.delete(&msg.id).await.unwrap();
        assert!(chat.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_delete_that_survives_is_restored() {
        let h = harness();
        let msg = seeded(&h, "bye").await;
        let chat = holder(&h);
        let _rx = opened(&chat).await;
        h.relational.set_ignore_deletes(true);

        let err = chat.delete(&msg.id).await.unwrap_err();
        assert!(matches!(err, ClientError::Verification(_)));
        let view = chat.snapshot();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, msg.id);
        assert!(matches!(chat.current_state(), ChatState::Error(_)));
    }

    #[tokio::test]
    async fn test_pending_message_cannot_be_edited_or_deleted() {
        let h = harness();
        let chat = holder(&h);
        let _rx = opened(&chat).await;
        let pending = MessageId::new_pending();

        assert!(matches!(
            chat.edit(&pending, "x").await,
            Err(ClientError::Model(_))
        ));
        assert!(matches!(
            chat.delete(&pending).await,
            Err(ClientError::Model(_))
        ));
    }

    #[tokio::test]
    async fn test_polling_picks_up_remote_messages() {
        let h = harness();
        let chat = ChatHolder::new(h.repo.clone(), Duration::from_millis(5));
        let mut rx = chat.open(TaskId::new("t1"));

        seeded(&h, "from elsewhere").await;
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                rx.changed().await.unwrap();
                if rx.borrow().iter().any(|m| m.text == "from elsewhere") {
                    break;
                }
            }
        })
        .await
        .expect("poll should deliver the new message");
    }

    #[tokio::test]
    async fn test_edit_survives_polls_while_in_flight() {
        let h = harness();
        let msg = seeded(&h, "hello").await;
        let chat = ChatHolder::new(h.repo.clone(), FAST_POLL);
        let _rx = opened(&chat).await;
        h.relational.set_write_delay(WRITE_DELAY);
        let selects_before = h.relational.select_count();

        let mid_edit = async {
            tokio::time::sleep(WRITE_DELAY / 2).await;
            (chat.snapshot(), h.relational.select_count())
        };
        let (result, (mid_view, mid_selects)) = tokio::join!(chat.edit(&msg.id, "hello all"), mid_edit);
        result.unwrap();
        assert!(mid_selects >= selects_before + 3, "polls ran during the edit");
        assert_eq!(mid_view[0].text, "hello all (edited)");

        tokio::time::sleep(Duration::from_millis(30)).await;
        let view = chat.snapshot();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].text, "hello all (edited)");
    }

    #[tokio::test]
    async fn test_deleted_message_stays_gone_across_polls() {
        let h = harness();
        let msg = seeded(&h, "bye").await;
        let chat = ChatHolder::new(h.repo.clone(), FAST_POLL);
        let _rx = opened(&chat).await;
        assert_eq!(chat.snapshot().len(), 1);
        h.relational.set_write_delay(WRITE_DELAY);
        let selects_before = h.relational.select_count();

        let mid_delete = async {
            tokio::time::sleep(WRITE_DELAY / 2).await;
            (chat.snapshot(), h.relational.select_count())
        };
        let (result, (mid_view, mid_selects)) = tokio::join!(chat.delete(&msg.id), mid_delete);
        result.unwrap();
        assert!(mid_selects >= selects_before + 3, "polls ran during the delete");
        assert!(mid_view.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.relational.rows(TABLE_CHAT_MESSAGES).is_empty());
        assert!(chat.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_under_polling_restores_once() {
        let h = harness();
        let msg = seeded(&h, "bye").await;
        let chat = ChatHolder::new(h.repo.clone(), FAST_POLL);
        let _rx = opened(&chat).await;
        h.relational.set_write_delay(WRITE_DELAY);
        h.relational.set_fail_writes(true);

        let (result, mid_view) = tokio::join!(chat.delete(&msg.id), async {
            tokio::time::sleep(WRITE_DELAY / 2).await;
            chat.snapshot()
        });
        assert!(result.is_err());
        assert!(mid_view.is_empty());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let view = chat.snapshot();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, msg.id);
    }

    #[test]
    fn test_insert_ordered_keeps_timestamp_order() {
        let out = OutgoingMessage::text(TaskId::new("t1"), UserId::new("u1"), Role::User, "x");
        let mut early = ChatMessage::placeholder(&out);
        let mut late = ChatMessage::placeholder(&out);
        early.timestamp = chrono::DateTime::<chrono::Utc>::default();
        late.timestamp = early.timestamp + chrono::Duration::seconds(5);

        let mut view = vec![late.clone()];
        insert_ordered(&mut view, early.clone());
        assert_eq!(view, vec![early, late]);
    }
}
