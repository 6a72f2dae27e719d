//! CRUD operations for cached [`ChatMessage`] records.
//!
//! Only server-confirmed messages are cached.  Optimistic placeholders live in
//! the chat view alone and are silently skipped here.

use rusqlite::{params, OptionalExtension};
use taskcomm_shared::{ChatMessage, MessageId, TaskId, UserId};

use crate::database::{parse_enum, parse_timestamp, Database};
use crate::error::Result;

const SELECT_COLUMNS: &str = "SELECT id, task_id, sender_role, sender_id, text, media_url, \
                              file_type, file_name, file_size, timestamp FROM chat_messages";

impl Database {
    /// Insert or replace a message.  Returns `false` (and writes nothing) for
    /// a pending placeholder.
    pub fn upsert_message(&self, message: &ChatMessage) -> Result<bool> {
        let Some(id) = message.id.confirmed_id() else {
            return Ok(false);
        };

        self.conn().execute(
            "INSERT OR REPLACE INTO chat_messages
                (id, task_id, sender_role, sender_id, text, media_url,
                 file_type, file_name, file_size, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                message.task_id.as_str(),
                message.sender_role.as_str(),
                message.sender_id.as_str(),
                message.text,
                message.media_url,
                message.file_type.as_str(),
                message.file_name,
                message.file_size,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(true)
    }

    /// Cache a batch of messages in one transaction.
    pub fn upsert_messages(&mut self, messages: &[ChatMessage]) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chat_messages
                    (id, task_id, sender_role, sender_id, text, media_url,
                     file_type, file_name, file_size, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for message in messages {
                let Some(id) = message.id.confirmed_id() else {
                    continue;
                };
                stmt.execute(params![
                    id,
                    message.task_id.as_str(),
                    message.sender_role.as_str(),
                    message.sender_id.as_str(),
                    message.text,
                    message.media_url,
                    message.file_type.as_str(),
                    message.file_name,
                    message.file_size,
                    message.timestamp.to_rfc3339(),
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn get_message(&self, id: &str) -> Result<Option<ChatMessage>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id], row_to_message)
            .optional()?)
    }

    /// Messages of one task, oldest first.
    pub fn list_messages_for_task(&self, task_id: &TaskId) -> Result<Vec<ChatMessage>> {
        let sql = format!("{SELECT_COLUMNS} WHERE task_id = ?1 ORDER BY timestamp ASC");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![task_id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Messages by one sender, newest first.
    pub fn list_messages_for_sender(&self, sender_id: &UserId) -> Result<Vec<ChatMessage>> {
        let sql = format!("{SELECT_COLUMNS} WHERE sender_id = ?1 ORDER BY timestamp DESC");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![sender_id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM chat_messages WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    pub fn delete_messages_for_task(&self, task_id: &TaskId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM chat_messages WHERE task_id = ?1",
            params![task_id.as_str()],
        )?;
        Ok(affected)
    }

    pub fn count_messages_for_task(&self, task_id: &TaskId) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE task_id = ?1",
            params![task_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role_str: String = row.get(2)?;
    let file_type_str: String = row.get(6)?;
    let ts_str: String = row.get(9)?;

    Ok(ChatMessage {
        id: MessageId::Confirmed(row.get(0)?),
        task_id: TaskId(row.get(1)?),
        sender_role: parse_enum(2, &role_str)?,
        sender_id: UserId(row.get(3)?),
        text: row.get(4)?,
        media_url: row.get(5)?,
        file_type: parse_enum(6, &file_type_str)?,
        file_name: row.get(7)?,
        file_size: row.get(8)?,
        timestamp: parse_timestamp(9, &ts_str)?,
    })
}
