//! Authentication primitives and the `profiles` role table.
//!
//! The sign-up/sign-in flows themselves live in the auth state holder; these
//! are the individual calls it composes.

use serde_json::Value;
use taskcomm_remote::{Query, Session};
use taskcomm_shared::constants::TABLE_PROFILES;
use taskcomm_shared::Role;
use tracing::{debug, warn};

use super::rows::{decode_rows, to_value, ProfileRow};
use super::Repository;
use crate::error::Result;

impl Repository {
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        Ok(self.backends.auth.sign_up(email, password).await?)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        Ok(self.backends.auth.sign_in(email, password).await?)
    }

    pub async fn sign_out(&self) -> Result<()> {
        Ok(self.backends.auth.sign_out().await?)
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.backends.auth.session().await
    }

    /// Role recorded in `profiles` for `user_id`.  Read failures count as
    /// "no row".
    pub async fn profile_role(&self, user_id: &str) -> Option<String> {
        self.profile_role_where("id", user_id).await
    }

    pub async fn profile_role_by_email(&self, email: &str) -> Option<String> {
        self.profile_role_where("email", email).await
    }

    async fn profile_role_where(&self, column: &str, value: &str) -> Option<String> {
        let query = Query::new().eq(column, value).limit(1);
        let rows = match self.backends.relational.select(TABLE_PROFILES, &query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(column, error = %e, "profile role lookup failed");
                return None;
            }
        };
        let role = decode_rows::<ProfileRow>(rows)
            .ok()?
            .into_iter()
            .next()
            .and_then(|row| row.role)
            .map(|role| role.to_lowercase());
        debug!(column, role = ?role, "profile role");
        role
    }

    /// Create or merge the `profiles` row for an account.
    pub async fn upsert_profile_row(
        &self,
        user_id: &str,
        email: &str,
        role: Role,
        name: Option<&str>,
    ) -> Result<Vec<Value>> {
        let row = ProfileRow {
            id: Some(user_id.to_string()),
            email: Some(email.to_string()),
            role: Some(role.as_str().to_string()),
            name: name.map(str::to_string),
        };
        Ok(self
            .backends
            .relational
            .upsert(TABLE_PROFILES, to_value(&row)?)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taskcomm_remote::RelationalBackend;

    use super::*;
    use crate::repository::test_support::harness;

    #[tokio::test]
    async fn test_role_lookup_by_id_and_email() {
        let h = harness();
        h.relational
            .insert(TABLE_PROFILES, json!({"id": "u1", "email": "a@b.c", "role": "User"}))
            .await
            .unwrap();

        assert_eq!(h.repo.profile_role("u1").await.as_deref(), Some("user"));
        assert_eq!(h.repo.profile_role_by_email("a@b.c").await.as_deref(), Some("user"));
        assert!(h.repo.profile_role("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_role_lookup_failure_is_none() {
        let h = harness();
        h.relational.set_fail_select(true);
        assert!(h.repo.profile_role("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_upsert_profile_row() {
        let h = harness();
        h.repo
            .upsert_profile_row("u1", "a@b.c", Role::User, Some("Ada"))
            .await
            .unwrap();
        h.repo
            .upsert_profile_row("u1", "a@b.c", Role::User, None)
            .await
            .unwrap();

        let rows = h.relational.rows(TABLE_PROFILES);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Ada");
        assert_eq!(rows[0]["role"], "user");
    }
}
