//! Wire shapes of backend rows and documents, and their conversion to the
//! shared models.
//!
//! Relational rows use snake_case columns; documents use camelCase fields.
//! Columns the backend may omit are optional and take the model's default.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskcomm_remote::RemoteError;
use taskcomm_shared::{
    ChatMessage, FileType, Instruction, InstructionId, InstructionStatus, MessageId,
    NewInstruction, NewTask, OutgoingMessage, Role, Task, TaskId, TaskStatus, UserId, UserProfile,
};
use tracing::warn;

use crate::error::{ClientError, Result};

/// Decode a batch of JSON rows into `T`.
pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| RemoteError::from(e).into()))
        .collect()
}

pub(crate) fn to_value<T: Serialize>(row: &T) -> Result<Value> {
    serde_json::to_value(row).map_err(|e| RemoteError::from(e).into())
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Parse a backend timestamp.  Accepts RFC-3339 and zone-less ISO-8601
/// (read as UTC); anything else, or nothing, maps to the epoch so repeated
/// fetches of the same row stay equal.
pub(crate) fn parse_backend_time(value: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = value else {
        return epoch();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Utc.from_utc_datetime(&naive);
    }
    warn!(value = raw, "unparsable timestamp");
    epoch()
}

fn parse_or_default<T: std::str::FromStr + Default>(field: &str, value: Option<&str>) -> T {
    match value {
        None => T::default(),
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(field, value = raw, "unknown value, using default");
            T::default()
        }),
    }
}

// ---------------------------------------------------------------------------
// chat_messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageRow {
    pub id: Option<String>,
    pub task_id: Option<String>,
    pub sender_id: Option<String>,
    pub sender_role: Option<String>,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub file_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: Option<String>,
}

impl MessageRow {
    pub fn into_message(self) -> Result<ChatMessage> {
        let id = self
            .id
            .ok_or_else(|| ClientError::InvalidRow("chat message without id".into()))?;
        Ok(ChatMessage {
            id: MessageId::confirmed(id),
            task_id: TaskId(self.task_id.unwrap_or_default()),
            sender_role: parse_or_default::<Role>("sender_role", self.sender_role.as_deref()),
            sender_id: UserId(self.sender_id.unwrap_or_default()),
            text: self.text.unwrap_or_default(),
            media_url: self.media_url,
            file_type: parse_or_default::<FileType>("file_type", self.file_type.as_deref()),
            file_name: self.file_name,
            file_size: self.file_size,
            timestamp: parse_backend_time(self.created_at.as_deref()),
        })
    }
}

/// Decode message rows, skipping (and logging) rows without an id.
pub(crate) fn decode_messages(rows: Vec<Value>) -> Result<Vec<ChatMessage>> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in decode_rows::<MessageRow>(rows)? {
        match row.into_message() {
            Ok(message) => messages.push(message),
            Err(e) => warn!(error = %e, "skipping chat row"),
        }
    }
    Ok(messages)
}

/// Insert payload.  The server assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct MessageInsert<'a> {
    pub task_id: &'a str,
    pub sender_id: &'a str,
    pub sender_role: &'a str,
    pub text: &'a str,
    pub media_url: Option<&'a str>,
    pub file_type: &'a str,
    pub file_name: Option<&'a str>,
}

impl<'a> From<&'a OutgoingMessage> for MessageInsert<'a> {
    fn from(m: &'a OutgoingMessage) -> Self {
        Self {
            task_id: m.task_id.as_str(),
            sender_id: m.sender_id.as_str(),
            sender_role: m.sender_role.as_str(),
            text: &m.text,
            media_url: m.media_url.as_deref(),
            file_type: m.file_type.as_str(),
            file_name: m.file_name.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// instructions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct InstructionRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub status: Option<String>,
}

impl InstructionRow {
    pub fn into_instruction(self) -> Result<Instruction> {
        let id = self
            .id
            .ok_or_else(|| ClientError::InvalidRow("instruction without id".into()))?;
        Ok(Instruction {
            id: InstructionId(id),
            user_id: UserId(self.user_id.unwrap_or_default()),
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            created_at: parse_backend_time(self.created_at.as_deref()),
            status: parse_or_default::<InstructionStatus>("status", self.status.as_deref()),
        })
    }
}

impl From<&NewInstruction> for InstructionRow {
    fn from(i: &NewInstruction) -> Self {
        Self {
            id: None,
            user_id: Some(i.user_id.to_string()),
            title: Some(i.title.clone()),
            description: Some(i.description.clone()),
            created_at: None,
            status: Some(i.status.as_str().to_string()),
        }
    }
}

impl From<&Instruction> for InstructionRow {
    fn from(i: &Instruction) -> Self {
        Self {
            id: Some(i.id.to_string()),
            user_id: Some(i.user_id.to_string()),
            title: Some(i.title.clone()),
            description: Some(i.description.clone()),
            created_at: Some(i.created_at.to_rfc3339()),
            status: Some(i.status.as_str().to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TaskRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub instruction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl TaskRow {
    pub fn into_task(self) -> Result<Task> {
        let id = self
            .id
            .ok_or_else(|| ClientError::InvalidRow("task without id".into()))?;
        Ok(Task {
            id: TaskId(id),
            instruction_id: InstructionId(self.instruction_id.unwrap_or_default()),
            admin_id: UserId(self.admin_id.unwrap_or_default()),
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            status: parse_or_default::<TaskStatus>("status", self.status.as_deref()),
            created_at: parse_backend_time(self.created_at.as_deref()),
            completed_at: self
                .completed_at
                .as_deref()
                .map(|raw| parse_backend_time(Some(raw))),
        })
    }
}

impl From<&NewTask> for TaskRow {
    fn from(t: &NewTask) -> Self {
        Self {
            id: None,
            instruction_id: Some(t.instruction_id.to_string()),
            admin_id: None,
            title: Some(t.title.clone()),
            description: Some(t.description.clone()),
            status: Some(t.status.as_str().to_string()),
            created_at: None,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// profiles (relational, role lookup only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ProfileRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// `users/{id}` document fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct UserDocument {
    pub name: String,
    pub address: String,
    pub business_field: String,
    pub created_at: Option<String>,
    pub email: String,
    pub is_admin: bool,
}

impl UserDocument {
    pub fn into_profile(self, id: &str) -> UserProfile {
        UserProfile {
            id: UserId::new(id),
            name: self.name,
            address: self.address,
            business_field: self.business_field,
            created_at: parse_backend_time(self.created_at.as_deref()),
            email: self.email,
            is_admin: self.is_admin,
        }
    }
}

impl From<&UserProfile> for UserDocument {
    fn from(p: &UserProfile) -> Self {
        Self {
            name: p.name.clone(),
            address: p.address.clone(),
            business_field: p.business_field.clone(),
            created_at: Some(p.created_at.to_rfc3339()),
            email: p.email.clone(),
            is_admin: p.is_admin,
        }
    }
}

/// `tasks/{id}` document fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskDocument {
    pub instruction_id: String,
    pub admin_id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<&Task> for TaskDocument {
    fn from(t: &Task) -> Self {
        Self {
            instruction_id: t.instruction_id.to_string(),
            admin_id: t.admin_id.to_string(),
            title: t.title.clone(),
            description: t.description.clone(),
            status: t.status.as_str().to_string(),
            created_at: t.created_at.to_rfc3339(),
            completed_at: t.completed_at.map(|c| c.to_rfc3339()),
        }
    }
}
