//! Entity records exchanged between the cache, the backends and the state
//! holders.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to whatever renders the state holders' observables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::EDITED_MARKER;
use crate::types::{
    FileType, InstructionId, InstructionStatus, MessageId, Role, TaskId, TaskStatus, UserId,
};

// ---------------------------------------------------------------------------
// UserProfile
// ---------------------------------------------------------------------------

/// A registered account.  Created at sign-up, mutated by profile updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub address: String,
    pub business_field: String,
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub is_admin: bool,
}

impl UserProfile {
    /// A fresh non-admin profile as written at sign-up.
    pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address: String::new(),
            business_field: String::new(),
            created_at: Utc::now(),
            email: email.into(),
            is_admin: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Instruction
// ---------------------------------------------------------------------------

/// A top-level work request created by a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instruction {
    pub id: InstructionId,
    /// Owning user.
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub status: InstructionStatus,
}

/// Fields supplied by the client when creating an instruction.  The backend
/// assigns the identity and creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewInstruction {
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub status: InstructionStatus,
}

impl NewInstruction {
    pub fn new(user_id: UserId, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            user_id,
            title: title.into(),
            description: description.into(),
            status: InstructionStatus::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// An admin-created unit of work scoped to one instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub instruction_id: InstructionId,
    /// Assigned admin.  Empty when the backend row carries none.
    pub admin_id: UserId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    pub instruction_id: InstructionId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// A single message in a task's chat thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub task_id: TaskId,
    pub sender_role: Role,
    pub sender_id: UserId,
    pub text: String,
    pub media_url: Option<String>,
    pub file_type: FileType,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build the optimistic placeholder shown while `outgoing` is in flight.
    pub fn placeholder(outgoing: &OutgoingMessage) -> Self {
        Self {
            id: MessageId::new_pending(),
            task_id: outgoing.task_id.clone(),
            sender_role: outgoing.sender_role,
            sender_id: outgoing.sender_id.clone(),
            text: outgoing.text.clone(),
            media_url: outgoing.media_url.clone(),
            file_type: outgoing.file_type,
            file_name: outgoing.file_name.clone(),
            file_size: outgoing.file_size,
            timestamp: Utc::now(),
        }
    }

    /// Whether the text carries the edited marker.
    ///
    /// This is a textual heuristic: a message whose author typed the marker
    /// literally is indistinguishable from an edited one.
    pub fn is_edited(&self) -> bool {
        self.text.ends_with(EDITED_MARKER)
    }

    /// The text with the edited marker stripped, for display.
    pub fn display_text(&self) -> &str {
        self.text.strip_suffix(EDITED_MARKER).unwrap_or(&self.text)
    }
}

/// Append the edited marker to `text`.
pub fn mark_edited(text: &str) -> String {
    format!("{text}{EDITED_MARKER}")
}

/// A message as submitted to the relational backend.  The server assigns the
/// identity and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub task_id: TaskId,
    pub sender_id: UserId,
    pub sender_role: Role,
    pub text: String,
    pub media_url: Option<String>,
    pub file_type: FileType,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

impl OutgoingMessage {
    pub fn text(task_id: TaskId, sender_id: UserId, sender_role: Role, text: impl Into<String>) -> Self {
        Self {
            task_id,
            sender_id,
            sender_role,
            text: text.into(),
            media_url: None,
            file_type: FileType::Text,
            file_name: None,
            file_size: None,
        }
    }

    /// An attachment message.  The media URL is filled in once the upload
    /// has completed.  A size the `bigint` column cannot hold is left out.
    pub fn attachment(
        task_id: TaskId,
        sender_id: UserId,
        sender_role: Role,
        file_name: impl Into<String>,
        file_size: usize,
        content_type: &str,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            task_id,
            sender_id,
            sender_role,
            text: format!("File: {file_name}"),
            media_url: None,
            file_type: FileType::from_content_type(content_type),
            file_name: Some(file_name),
            file_size: i64::try_from(file_size).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing() -> OutgoingMessage {
        OutgoingMessage::text(TaskId::new("t1"), UserId::new("u1"), Role::User, "hi")
    }

    #[test]
    fn test_placeholder_is_pending() {
        let msg = ChatMessage::placeholder(&outgoing());
        assert!(msg.id.is_pending());
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.file_type, FileType::Text);
    }

    #[test]
    fn test_edited_marker_detection() {
        let mut msg = ChatMessage::placeholder(&outgoing());
        assert!(!msg.is_edited());
        msg.text = mark_edited("hello");
        assert!(msg.is_edited());
        assert_eq!(msg.display_text(), "hello");
    }

    #[test]
    fn test_attachment_text_and_type() {
        let out = OutgoingMessage::attachment(
            TaskId::new("t1"),
            UserId::new("u1"),
            Role::Admin,
            "plan.pdf",
            42,
            "application/pdf",
        );
        assert_eq!(out.text, "File: plan.pdf");
        assert_eq!(out.file_type, FileType::Document);
        assert_eq!(out.file_size, Some(42));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_attachment_size_out_of_range_is_dropped() {
        let out = OutgoingMessage::attachment(
            TaskId::new("t1"),
            UserId::new("u1"),
            Role::User,
            "huge.bin",
            usize::MAX,
            "application/octet-stream",
        );
        assert_eq!(out.file_size, None);
        assert_eq!(out.file_name.as_deref(), Some("huge.bin"));
    }
}
