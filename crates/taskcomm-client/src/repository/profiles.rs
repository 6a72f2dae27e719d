//! User profiles, held in the document store under `users/{id}`.

use std::time::Duration;

use taskcomm_remote::{listen, Document, Query};
use taskcomm_shared::constants::COLLECTION_USERS;
use taskcomm_shared::{UserId, UserProfile};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::rows::{to_value, UserDocument};
use super::Repository;
use crate::error::Result;

fn document_to_profile(doc: Document) -> Option<UserProfile> {
    match serde_json::from_value::<UserDocument>(doc.fields) {
        Ok(fields) => Some(fields.into_profile(&doc.id)),
        Err(e) => {
            warn!(id = %doc.id, error = %e, "skipping malformed user document");
            None
        }
    }
}

impl Repository {
    /// Cached profile, or the document on a cache miss (which is then
    /// cached).  `None` when neither has it or the document read fails.
    pub async fn get_user_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        if let Some(profile) = self.with_cache(|db| db.get_profile(user_id))? {
            return Ok(Some(profile));
        }

        let doc = match self
            .backends
            .documents
            .get(COLLECTION_USERS, user_id.as_str())
            .await
        {
            Ok(doc) => doc,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "profile fetch failed");
                return Ok(None);
            }
        };

        let profile = doc.and_then(document_to_profile);
        if let Some(profile) = &profile {
            self.mirror("profile", |db| db.upsert_profile(profile));
        }
        Ok(profile)
    }

    /// Write the profile document, then the cache.
    pub async fn update_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let fields = to_value(&UserDocument::from(profile))?;
        self.backends
            .documents
            .set(COLLECTION_USERS, profile.id.as_str(), fields)
            .await?;
        self.mirror("profile", |db| db.upsert_profile(profile));
        debug!(user_id = %profile.id, "profile updated");
        Ok(())
    }

    /// Store a profile in the cache only.
    pub fn cache_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.with_cache(|db| db.upsert_profile(profile))
    }

    /// Live list of every user profile.  Each snapshot is also mirrored to
    /// the cache.  The stream ends on the first backend failure, which is
    /// forwarded, or when the receiver is dropped.
    pub fn observe_all_users(
        self: &std::sync::Arc<Self>,
        interval: Duration,
    ) -> mpsc::Receiver<Result<Vec<UserProfile>>> {
        let mut docs = listen(
            self.backends.documents.clone(),
            COLLECTION_USERS,
            Query::new(),
            interval,
        );
        let (tx, rx) = mpsc::channel(16);
        let repo = self.clone();

        tokio::spawn(async move {
            while let Some(snapshot) = docs.recv().await {
                let item = snapshot.map_err(Into::into).map(|docs| {
                    let profiles: Vec<UserProfile> =
                        docs.into_iter().filter_map(document_to_profile).collect();
                    for profile in &profiles {
                        repo.mirror("profile", |db| db.upsert_profile(profile));
                    }
                    profiles
                });
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use taskcomm_remote::DocumentBackend;

    use super::*;
    use crate::repository::test_support::harness;

    #[tokio::test]
    async fn test_cache_miss_reads_document_and_caches() {
        let h = harness();
        h.documents
            .set(
                COLLECTION_USERS,
                "u1",
                json!({"name": "Ada", "email": "ada@example.com", "isAdmin": false}),
            )
            .await
            .unwrap();

        let id = UserId::new("u1");
        let profile = h.repo.get_user_profile(&id).await.unwrap().unwrap();
        assert_eq!(profile.name, "Ada");

        // Served from the cache once the document store is gone.
        h.documents.set_failing(true);
        assert!(h.repo.get_user_profile(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_profile_is_none() {
        let h = harness();
        assert!(h.repo.get_user_profile(&UserId::new("ghost")).await.unwrap().is_none());
        h.documents.set_failing(true);
        assert!(h.repo.get_user_profile(&UserId::new("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_writes_document_then_cache() {
        let h = harness();
        let mut profile = UserProfile::new(UserId::new("u1"), "Ada", "ada@example.com");
        profile.business_field = "Engineering".into();
        h.repo.update_user_profile(&profile).await.unwrap();

        let doc = h.documents.get(COLLECTION_USERS, "u1").await.unwrap().unwrap();
        assert_eq!(doc.fields["businessField"], "Engineering");

        h.documents.set_failing(true);
        profile.name = "Ada L.".into();
        assert!(h.repo.update_user_profile(&profile).await.is_err());
        let cached = h.repo.get_user_profile(&profile.id).await.unwrap().unwrap();
        assert_eq!(cached.name, "Ada");
    }

    #[tokio::test]
    async fn test_observe_all_users() {
        let h = harness();
        let profile = UserProfile::new(UserId::new("u1"), "Ada", "ada@example.com");
        h.repo.update_user_profile(&profile).await.unwrap();

        let mut rx = h.repo.observe_all_users(Duration::from_millis(5));
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        let other = UserProfile::new(UserId::new("u2"), "Grace", "grace@example.com");
        h.repo.update_user_profile(&other).await.unwrap();
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.len(), 2);
    }
}
