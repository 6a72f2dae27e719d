use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::LOCAL_ID_PREFIX;
use crate::error::ModelError;

// ---------------------------------------------------------------------------
// Entity identities
// ---------------------------------------------------------------------------

// Identities are opaque strings assigned by whichever backend owns the entity.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct InstructionId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl InstructionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Message identity
// ---------------------------------------------------------------------------

/// Identity of a chat message.
///
/// A message the client has appended optimistically carries a
/// [`MessageId::Pending`] token until the relational backend hands back the
/// row it stored, at which point the message is known by its
/// [`MessageId::Confirmed`] identity.  The two never compare equal, so a
/// placeholder can never shadow a server row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageId {
    Pending(String),
    Confirmed(String),
}

impl MessageId {
    /// Generate a fresh client-local placeholder token.
    pub fn new_pending() -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        Self::Pending(format!(
            "{LOCAL_ID_PREFIX}{}-{}",
            Utc::now().timestamp_millis(),
            &nonce[..8]
        ))
    }

    pub fn confirmed(id: impl Into<String>) -> Self {
        Self::Confirmed(id.into())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The server-assigned identity, if any.
    pub fn confirmed_id(&self) -> Option<&str> {
        match self {
            Self::Confirmed(id) => Some(id),
            Self::Pending(_) => None,
        }
    }

    /// Like [`confirmed_id`](Self::confirmed_id) but as an error for callers
    /// that must talk to the server about this message.
    pub fn require_confirmed(&self) -> Result<&str, ModelError> {
        self.confirmed_id()
            .ok_or_else(|| ModelError::NotConfirmed(self.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending(token) | Self::Confirmed(token) => token,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Who authored a message, or which kind of account a profile row describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ModelError;

    /// Case-insensitive, since profile rows are edited by hand on the admin side.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(ModelError::UnknownValue {
                field: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// Payload kind of a chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    #[default]
    Text,
    Image,
    Document,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
        }
    }

    /// Classify an uploaded attachment by its MIME type.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            Self::Image
        } else {
            Self::Document
        }
    }
}

impl FromStr for FileType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            _ => Err(ModelError::UnknownValue {
                field: "file_type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl InstructionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for InstructionStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(ModelError::UnknownValue {
                field: "instruction status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            _ => Err(ModelError::UnknownValue {
                field: "task status",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_ids_are_unique_and_prefixed() {
        let a = MessageId::new_pending();
        let b = MessageId::new_pending();
        assert_ne!(a, b);
        assert!(a.is_pending());
        assert!(a.as_str().starts_with(LOCAL_ID_PREFIX));
        assert!(a.confirmed_id().is_none());
    }

    #[test]
    fn test_pending_never_equals_confirmed() {
        let pending = MessageId::Pending("abc".into());
        let confirmed = MessageId::confirmed("abc");
        assert_ne!(pending, confirmed);
        assert!(pending.require_confirmed().is_err());
        assert_eq!(confirmed.require_confirmed().unwrap(), "abc");
    }

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" user ".parse::<Role>().unwrap(), Role::User);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_file_type_from_content_type() {
        assert_eq!(FileType::from_content_type("image/png"), FileType::Image);
        assert_eq!(FileType::from_content_type("application/pdf"), FileType::Document);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(InstructionStatus::InProgress.as_str(), "in_progress");
        assert_eq!(
            "in_progress".parse::<InstructionStatus>().unwrap(),
            InstructionStatus::InProgress
        );
        assert_eq!(
            serde_json::to_string(&InstructionStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert!("done".parse::<TaskStatus>().is_err());
    }
}
