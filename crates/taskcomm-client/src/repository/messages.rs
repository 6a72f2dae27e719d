//! Chat messages in the relational `chat_messages` table, plus attachment
//! upload.
//!
//! Edits and deletes are verified by re-reading after a short settle delay:
//! row-level security can make a write "succeed" without touching anything,
//! so the write call's own result is not trusted.

use bytes::Bytes;
use serde_json::json;
use taskcomm_remote::{Direction, Query};
use taskcomm_shared::constants::{TABLE_CHAT_MESSAGES, UPLOAD_PREFIX};
use taskcomm_shared::{mark_edited, ChatMessage, MessageId, OutgoingMessage, TaskId};
use tracing::{debug, info, warn};

use super::rows::{decode_messages, to_value, MessageInsert};
use super::Repository;
use crate::error::{ClientError, Result};

/// Targets one row by primary key.  Carries no limit so it is also valid as
/// the filter of a `PATCH` or `DELETE`.
fn by_id(id: &str) -> Query {
    Query::new().eq("id", id)
}

fn by_task(task_id: &TaskId) -> Query {
    Query::new()
        .eq("task_id", task_id.as_str())
        .order("created_at", Direction::Ascending)
}

impl Repository {
    /// Insert a message and return the row the server stored.
    pub async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<ChatMessage> {
        let rows = self
            .backends
            .relational
            .insert(TABLE_CHAT_MESSAGES, to_value(&MessageInsert::from(outgoing))?)
            .await?;
        let mut message = decode_messages(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Verification("message insert returned no row".into()))?;
        // The table has no size column; keep what the sender knew.
        if message.file_size.is_none() {
            message.file_size = outgoing.file_size;
        }

        self.mirror("message", |db| db.upsert_message(&message));
        info!(task_id = %outgoing.task_id, message_id = %message.id, "message sent");
        Ok(message)
    }

    /// Every message of a task, oldest first.  The task's cached messages
    /// are replaced by the fetched rows.
    pub async fn fetch_messages(&self, task_id: &TaskId) -> Result<Vec<ChatMessage>> {
        let rows = self
            .backends
            .relational
            .select(TABLE_CHAT_MESSAGES, &by_task(task_id))
            .await?;
        let messages = decode_messages(rows)?;
        debug!(task_id = %task_id, count = messages.len(), "messages fetched");

        self.mirror("messages", |db| {
            db.delete_messages_for_task(task_id)?;
            db.upsert_messages(&messages)
        });
        Ok(messages)
    }

    /// One-row read of the messages table, used to tell "table unreachable"
    /// apart from "task has no messages" in the logs.
    pub async fn probe_messages_table(&self) -> Result<usize> {
        let rows = self
            .backends
            .relational
            .select(TABLE_CHAT_MESSAGES, &Query::new().limit(1))
            .await?;
        Ok(rows.len())
    }

    /// Replace a message's text with `new_text` plus the edited marker and
    /// verify the write.  Returns the verified row.
    ///
    /// Fails when the message is pending, missing before the write, missing
    /// after it, or when either re-read (by id, then through the task's
    /// message list) shows different text.
    pub async fn edit_message(&self, id: &MessageId, new_text: &str) -> Result<ChatMessage> {
        let id = id.require_confirmed()?;

        let existing = self.find_message(id).await?.ok_or_else(|| {
            warn!(message_id = id, "edit target not found");
            ClientError::NotFound(format!("message {id}"))
        })?;
        self.log_session(id).await;

        let marked = mark_edited(new_text);
        let touched = self
            .backends
            .relational
            .update(TABLE_CHAT_MESSAGES, json!({ "text": marked }), &by_id(id))
            .await?;
        debug!(message_id = id, rows = touched.len(), "update issued");

        tokio::time::sleep(self.verify_delay).await;

        let updated = self.find_message(id).await?.ok_or_else(|| {
            ClientError::Verification("message no longer exists after edit".into())
        })?;
        if updated.text != marked {
            warn!(message_id = id, expected = %marked, actual = %updated.text, "edit not applied");
            return Err(ClientError::Verification(
                "message text not updated after edit".into(),
            ));
        }

        let in_task = self.fetch_messages(&existing.task_id).await?;
        let listed = in_task.iter().find(|m| m.id.confirmed_id() == Some(id));
        if listed.map(|m| m.text.as_str()) != Some(marked.as_str()) {
            return Err(ClientError::Verification(
                "message not updated correctly in task messages".into(),
            ));
        }

        self.mirror("message", |db| db.upsert_message(&updated));
        info!(message_id = id, "message edited");
        Ok(updated)
    }

    /// Delete a message and verify it is gone.  Deleting a message that no
    /// longer exists succeeds.
    pub async fn delete_message(&self, id: &MessageId) -> Result<()> {
        let id = id.require_confirmed()?;

        let Some(existing) = self.find_message(id).await? else {
            warn!(message_id = id, "delete target already gone");
            self.mirror("message", |db| db.delete_message(id));
            return Ok(());
        };
        self.log_session(id).await;

        let removed = self
            .backends
            .relational
            .delete(TABLE_CHAT_MESSAGES, &by_id(id))
            .await?;
        debug!(message_id = id, rows = removed.len(), "delete issued");

        tokio::time::sleep(self.verify_delay).await;

        if let Some(still) = self.find_message(id).await? {
            warn!(message_id = id, text = %still.text, "message survived delete");
            return Err(ClientError::Verification(
                "message still exists after delete".into(),
            ));
        }
        let in_task = self.fetch_messages(&existing.task_id).await?;
        if in_task.iter().any(|m| m.id.confirmed_id() == Some(id)) {
            return Err(ClientError::Verification(
                "message still appears in task messages after delete".into(),
            ));
        }

        self.mirror("message", |db| db.delete_message(id));
        info!(message_id = id, "message deleted");
        Ok(())
    }

    pub fn cached_messages(&self, task_id: &TaskId) -> Result<Vec<ChatMessage>> {
        self.with_cache(|db| db.list_messages_for_task(task_id))
    }

    pub fn message_count(&self, task_id: &TaskId) -> Result<u64> {
        self.with_cache(|db| db.count_messages_for_task(task_id))
    }

    /// Upload an attachment under the uploads folder and return its URL.
    pub async fn upload_attachment(
        &self,
        file_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String> {
        let path = format!("{UPLOAD_PREFIX}{file_name}");
        Ok(self.backends.blobs.upload(&path, data, content_type).await?)
    }

    pub(crate) async fn find_message(&self, id: &str) -> Result<Option<ChatMessage>> {
        let rows = self
            .backends
            .relational
            .select(TABLE_CHAT_MESSAGES, &by_id(id).limit(1))
            .await?;
        Ok(decode_messages(rows)?.into_iter().next())
    }

    async fn log_session(&self, message_id: &str) {
        match self.backends.auth.session().await {
            Some(session) => debug!(
                message_id,
                user_id = %session.user.id,
                role = ?session.user.role,
                "writing as"
            ),
            None => warn!(message_id, "writing without a session"),
        }
    }
}
