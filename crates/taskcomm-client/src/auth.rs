//! Authentication state holder.
//!
//! Only accounts whose `profiles` row carries the `user` role may sign in;
//! the admin side of the system uses a separate client.

use std::sync::Arc;

use taskcomm_shared::{Role, UserId, UserProfile};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{AuthError, ClientError, Result};
use crate::repository::Repository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Initial,
    Loading,
    Authenticated { user_id: UserId, email: String },
    Unauthenticated,
    Error(String),
}

pub struct AuthHolder {
    repo: Arc<Repository>,
    state: watch::Sender<AuthState>,
}

impl AuthHolder {
    pub fn new(repo: Arc<Repository>) -> Self {
        let (state, _) = watch::channel(AuthState::Initial);
        Self { repo, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// The signed-in account, if any.
    pub fn user_id(&self) -> Option<UserId> {
        match &*self.state.borrow() {
            AuthState::Authenticated { user_id, .. } => Some(user_id.clone()),
            _ => None,
        }
    }

    /// Leave `Initial`, resuming a session the backend still holds.
    pub async fn init(&self) {
        let next = match self.repo.current_session().await {
            Some(session) => AuthState::Authenticated {
                user_id: UserId::new(session.user.id),
                email: session.user.email.unwrap_or_default(),
            },
            None => AuthState::Unauthenticated,
        };
        self.state.send_replace(next);
    }

    /// Register an account, create its `user` profile row and sign in.
    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<UserId> {
        self.state.send_replace(AuthState::Loading);
        let outcome = self.try_sign_up(email, password, name).await;
        self.settle(email, outcome)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserId> {
        self.state.send_replace(AuthState::Loading);
        let outcome = self
            .try_sign_in(email, password)
            .await
            .map_err(|e| match e {
                AuthError::EmailNotConfirmed => AuthError::VerificationLinkSent,
                other => other,
            });
        self.settle(email, outcome)
    }

    /// Sign out remotely (best effort) and wipe the local cache.
    pub async fn sign_out(&self) {
        if let Err(e) = self.repo.sign_out().await {
            warn!(error = %e, "remote sign-out failed");
        }
        if let Err(e) = self.repo.clear_local_data() {
            warn!(error = %e, "cache wipe failed");
        }
        self.state.send_replace(AuthState::Unauthenticated);
        info!("signed out");
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, AuthState::Error(_)) {
                *state = AuthState::Unauthenticated;
                true
            } else {
                false
            }
        });
    }

    async fn try_sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> std::result::Result<String, AuthError> {
        let user_id = match self.repo.sign_up(email, password).await? {
            Some(session) => session.user.id,
            None => {
                debug!("no session after sign-up, trying sign-in");
                self.repo.sign_in(email, password).await?;
                self.repo
                    .current_session()
                    .await
                    .map(|s| s.user.id)
                    .ok_or(AuthError::VerifyEmail)?
            }
        };

        self.repo
            .upsert_profile_row(&user_id, email, Role::User, Some(name))
            .await
            .map_err(|e| AuthError::ProfileCreation(e.to_string()))?;

        if self.repo.profile_role(&user_id).await.as_deref() != Some(Role::User.as_str()) {
            return Err(AuthError::InvalidProfile);
        }

        let profile = UserProfile::new(UserId::new(user_id.as_str()), name, email);
        if let Err(e) = self.repo.cache_user_profile(&profile) {
            warn!(user_id = %user_id, error = %e, "profile not cached");
        }
        Ok(user_id)
    }

    async fn try_sign_in(&self, email: &str, password: &str) -> std::result::Result<String, AuthError> {
        let session = self.repo.sign_in(email, password).await?;
        let user_id = session.user.id;
        let session_email = session.user.email.filter(|e| !e.trim().is_empty());

        let mut role = self.repo.profile_role(&user_id).await;
        if role.is_none() {
            if let Some(address) = &session_email {
                role = self.repo.profile_role_by_email(address).await;
            }
        }
        if role.is_none() {
            let address = session_email.as_deref().unwrap_or(email);
            match self
                .repo
                .upsert_profile_row(&user_id, address, Role::User, None)
                .await
            {
                Ok(_) => role = Some(Role::User.as_str().to_string()),
                Err(e) => warn!(user_id = %user_id, error = %e, "profile backfill failed"),
            }
        }

        if role.as_deref() != Some(Role::User.as_str()) {
            warn!(user_id = %user_id, role = ?role, "sign-in refused");
            if let Err(e) = self.repo.sign_out().await {
                debug!(error = %e, "sign-out after refusal failed");
            }
            return Err(AuthError::NotAuthorized);
        }
        Ok(user_id)
    }

    fn settle(
        &self,
        email: &str,
        outcome: std::result::Result<String, AuthError>,
    ) -> Result<UserId> {
        match outcome {
            Ok(id) => {
                let user_id = UserId::new(id);
                info!(user_id = %user_id, "authenticated");
                self.state.send_replace(AuthState::Authenticated {
                    user_id: user_id.clone(),
                    email: email.to_string(),
                });
                Ok(user_id)
            }
            Err(e) => {
                warn!(error = %e, "authentication failed");
                self.state.send_replace(AuthState::Error(e.to_string()));
                Err(ClientError::Auth(e))
            }
        }
    }
}
