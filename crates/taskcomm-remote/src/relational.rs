//! Relational backend and its authentication service.
//!
//! Rows cross this boundary as JSON objects; the repository owns the typed
//! row structs and their conversion to domain models.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::query::Query;

/// Table CRUD over JSON rows.  Every write returns the rows it affected as
/// the backend stored them, so callers can read back server-assigned columns.
///
/// Row-level security may silently hide rows: an update or delete that
/// matches nothing the caller may touch succeeds with an empty result.
#[async_trait]
pub trait RelationalBackend: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>>;

    /// Insert, or merge into the row with the same primary key.
    async fn upsert(&self, table: &str, row: Value) -> Result<Vec<Value>>;

    async fn update(&self, table: &str, patch: Value, query: &Query) -> Result<Vec<Value>>;

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>>;
}

/// The account behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    /// `app_metadata.role`, when the backend sets one.
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

impl Session {
    /// Parse a token response (`access_token`, `refresh_token`, `user`).
    /// Returns `None` for a bare user object, which is what sign-up answers
    /// while email confirmation is pending.
    pub fn from_json(json: &Value) -> Option<Self> {
        let access_token = json.get("access_token")?.as_str()?.to_string();
        let user = AuthUser::from_json(json.get("user")?)?;
        Some(Self {
            access_token,
            refresh_token: json
                .get("refresh_token")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            user,
        })
    }
}

impl AuthUser {
    pub fn from_json(json: &Value) -> Option<Self> {
        Some(Self {
            id: json.get("id")?.as_str()?.to_string(),
            email: json.get("email").and_then(|v| v.as_str()).map(str::to_string),
            role: json
                .get("app_metadata")
                .and_then(|m| m.get("role"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }
}

/// Email/password authentication.  The signed-in session is held by the
/// implementation and used to authorise subsequent table requests.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Register an account.  `None` means the account exists but no session
    /// was issued (typically because the email is not confirmed yet).
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Drop the current session.  The local session is cleared even when the
    /// remote call fails.
    async fn sign_out(&self) -> Result<()>;

    async fn session(&self) -> Option<Session>;
}
