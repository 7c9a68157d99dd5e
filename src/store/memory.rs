//! In-memory store backends
//!
//! Sharded `DashMap`s give per-key atomicity without a global lock. Suitable
//! for single-process deployments and tests; records do not survive restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use webauthn_rs::prelude::Passkey;

use super::{ChallengeStore, CredentialStore};
use crate::error::StoreError;
use crate::models::{AuthenticatorCredential, PasskeyUser, StoredChallenge};

/// Challenge store keyed by identity
#[derive(Default)]
pub struct InMemoryChallengeStore {
    challenges: DashMap<String, StoredChallenge>,
}

impl InMemoryChallengeStore {
    #[must_use]
    pub fn new() -> Self {
        log::info!("Creating in-memory challenge store");
        Self::default()
    }

    /// Number of outstanding challenges
    #[must_use]
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn put(&self, challenge: StoredChallenge) -> Result<(), StoreError> {
        self.challenges
            .insert(challenge.identity.clone(), challenge);
        Ok(())
    }

    async fn get(&self, identity: &str) -> Result<Option<StoredChallenge>, StoreError> {
        Ok(self.challenges.get(identity).map(|entry| entry.clone()))
    }

    async fn take(&self, identity: &str) -> Result<Option<StoredChallenge>, StoreError> {
        Ok(self.challenges.remove(identity).map(|(_, challenge)| challenge))
    }

    async fn delete(&self, identity: &str) -> Result<(), StoreError> {
        self.challenges.remove(identity);
        Ok(())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.challenges.len();
        self.challenges
            .retain(|_, challenge| challenge.created_at > cutoff);
        Ok(before.saturating_sub(self.challenges.len()))
    }
}

impl std::fmt::Debug for InMemoryChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChallengeStore")
            .field("challenges", &self.challenges.len())
            .finish()
    }
}

/// Credential store with a secondary handle index
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: DashMap<String, PasskeyUser>,
    handles: DashMap<String, String>,
    credentials: DashMap<String, AuthenticatorCredential>,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        log::info!("Creating in-memory credential store");
        Self::default()
    }

    fn claim_handle(&self, handle: &str, identity: &str) -> Result<(), StoreError> {
        match self.handles.entry(handle.to_string()) {
            Entry::Occupied(owner) if owner.get() != identity => Err(StoreError::Conflict(
                format!("handle {handle} already registered"),
            )),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(identity.to_string());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create_user_if_absent(&self, user: PasskeyUser) -> Result<PasskeyUser, StoreError> {
        // Claim the handle first so two identities cannot share it
        self.claim_handle(&user.handle, &user.owner_identity)?;

        match self.users.entry(user.owner_identity.clone()) {
            Entry::Vacant(slot) => Ok(slot.insert(user).clone()),
            Entry::Occupied(mut existing) => {
                let previous = existing.get().handle.clone();
                if previous != user.handle {
                    log::info!(
                        "Handle of identity {} changed from {previous} to {}",
                        user.owner_identity,
                        user.handle
                    );
                    existing.get_mut().handle.clone_from(&user.handle);
                    self.handles
                        .remove_if(&previous, |_, owner| owner == &user.owner_identity);
                }
                Ok(existing.get().clone())
            }
        }
    }

    async fn find_user(&self, identity: &str) -> Result<Option<PasskeyUser>, StoreError> {
        Ok(self.users.get(identity).map(|user| user.clone()))
    }

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<PasskeyUser>, StoreError> {
        let Some(identity) = self.handles.get(handle).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&identity).map(|user| user.clone()))
    }

    async fn insert_credential(
        &self,
        credential: AuthenticatorCredential,
    ) -> Result<(), StoreError> {
        let credential_id = credential.credential_id.clone();
        let owner = credential.owner_identity.clone();

        if !self.users.contains_key(&owner) {
            return Err(StoreError::NotFound(format!("user {owner}")));
        }

        match self.credentials.entry(credential_id.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "credential {credential_id} already registered"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(credential);
            }
        }

        if let Some(mut user) = self.users.get_mut(&owner) {
            if !user.devices.contains(&credential_id) {
                user.devices.push(credential_id);
            }
        }
        Ok(())
    }

    async fn find_credential(
        &self,
        credential_id: &str,
    ) -> Result<Option<AuthenticatorCredential>, StoreError> {
        Ok(self.credentials.get(credential_id).map(|c| c.clone()))
    }

    async fn credentials_for(
        &self,
        identity: &str,
    ) -> Result<Vec<AuthenticatorCredential>, StoreError> {
        let Some(device_ids) = self.users.get(identity).map(|user| user.devices.clone()) else {
            return Ok(Vec::new());
        };
        Ok(device_ids
            .iter()
            .filter_map(|id| self.credentials.get(id).map(|c| c.clone()))
            .collect())
    }

    async fn update_counter(
        &self,
        credential_id: &str,
        expected: u32,
        new_counter: u32,
        public_key: Passkey,
        used_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut credential = self
            .credentials
            .get_mut(credential_id)
            .ok_or_else(|| StoreError::NotFound(format!("credential {credential_id}")))?;

        if credential.sign_counter != expected {
            return Ok(false);
        }

        credential.sign_counter = new_counter;
        credential.public_key = public_key;
        credential.last_used_at = Some(used_at);
        Ok(true)
    }

    async fn flag_for_review(&self, credential_id: &str) -> Result<(), StoreError> {
        let mut credential = self
            .credentials
            .get_mut(credential_id)
            .ok_or_else(|| StoreError::NotFound(format!("credential {credential_id}")))?;
        credential.flagged_for_review = true;
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCredentialStore")
            .field("users", &self.users.len())
            .field("credentials", &self.credentials.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CeremonyKind, UserIdentity};
    use chrono::Duration;

    fn challenge(identity: &str, nonce: &str) -> StoredChallenge {
        StoredChallenge {
            identity: identity.to_string(),
            nonce: nonce.to_string(),
            kind: CeremonyKind::Registration,
            state: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    fn user(id: &str, email: &str) -> PasskeyUser {
        PasskeyUser::new(&UserIdentity {
            user_id: id.to_string(),
            email: email.to_string(),
            username: id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_challenge() {
        let store = InMemoryChallengeStore::new();
        store.put(challenge("u1", "first")).await.unwrap();
        store.put(challenge("u1", "second")).await.unwrap();

        assert_eq!(store.len(), 1);
        let current = store.get("u1").await.unwrap().unwrap();
        assert_eq!(current.nonce, "second");
    }

    #[tokio::test]
    async fn test_take_consumes_exactly_once() {
        let store = InMemoryChallengeStore::new();
        store.put(challenge("u1", "nonce")).await.unwrap();

        assert!(store.take("u1").await.unwrap().is_some());
        assert!(store.take("u1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_challenges() {
        let store = InMemoryChallengeStore::new();
        let mut old = challenge("old", "a");
        old.created_at = Utc::now() - Duration::minutes(30);
        store.put(old).await.unwrap();
        store.put(challenge("new", "b")).await.unwrap();

        let purged = store
            .purge_expired(Utc::now() - Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired_evicts_challenge_at_cutoff() {
        let store = InMemoryChallengeStore::new();
        let ttl = Duration::minutes(5);
        let now = Utc::now();
        let mut boundary = challenge("boundary", "a");
        boundary.created_at = now - ttl;
        assert!(boundary.is_expired(ttl, now));
        store.put(boundary).await.unwrap();

        assert_eq!(store.purge_expired(now - ttl).await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_challenge_and_tolerates_missing() {
        let store = InMemoryChallengeStore::new();
        store.put(challenge("u1", "nonce")).await.unwrap();
        store.put(challenge("u2", "other")).await.unwrap();

        store.delete("u1").await.unwrap();
        assert!(store.get("u1").await.unwrap().is_none());
        assert!(store.get("u2").await.unwrap().is_some());

        // Missing keys are not an error
        store.delete("u1").await.unwrap();
        store.delete("never-issued").await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_create_user_if_absent_returns_existing() {
        let store = InMemoryCredentialStore::new();
        let first = store
            .create_user_if_absent(user("1", "a@example.com"))
            .await
            .unwrap();
        let second = store
            .create_user_if_absent(user("1", "a@example.com"))
            .await
            .unwrap();

        assert_eq!(first.user_handle, second.user_handle);
        let by_handle = store
            .find_user_by_handle("a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_handle.owner_identity, "1");
    }

    #[tokio::test]
    async fn test_handle_is_unique_across_identities() {
        let store = InMemoryCredentialStore::new();
        store
            .create_user_if_absent(user("1", "a@example.com"))
            .await
            .unwrap();
        let result = store
            .create_user_if_absent(user("2", "a@example.com"))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_changed_handle_moves_the_index() {
        let store = InMemoryCredentialStore::new();
        let original = store
            .create_user_if_absent(user("1", "a@example.com"))
            .await
            .unwrap();
        let renamed = store
            .create_user_if_absent(user("1", "b@example.com"))
            .await
            .unwrap();

        assert_eq!(renamed.handle, "b@example.com");
        assert_eq!(renamed.user_handle, original.user_handle);
        assert!(store
            .find_user_by_handle("a@example.com")
            .await
            .unwrap()
            .is_none());
        let by_handle = store
            .find_user_by_handle("b@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_handle.owner_identity, "1");

        // The released handle is free for another identity
        assert!(store
            .create_user_if_absent(user("2", "a@example.com"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_racing_handles_leave_one_indexed() {
        let store = std::sync::Arc::new(InMemoryCredentialStore::new());
        let (first, second) = tokio::join!(
            store.create_user_if_absent(user("1", "a@example.com")),
            store.create_user_if_absent(user("1", "b@example.com")),
        );
        first.unwrap();
        second.unwrap();

        let stored = store.find_user("1").await.unwrap().unwrap();
        assert_eq!(store.handles.len(), 1);
        assert_eq!(
            store.handles.get(&stored.handle).map(|id| id.clone()),
            Some("1".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_credential_updates_fail() {
        let store = InMemoryCredentialStore::new();
        assert!(matches!(
            store.flag_for_review("missing").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.find_credential("missing").await.unwrap().is_none());
        assert!(store.credentials_for("nobody").await.unwrap().is_empty());
    }
}
