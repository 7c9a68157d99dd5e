//! Challenge and credential storage
//!
//! The ceremony engine only depends on these traits. Every operation is atomic
//! per key and implementations must not serialise unrelated keys behind a
//! single lock. The bundled [`memory`] backend satisfies both with sharded maps.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use webauthn_rs::prelude::Passkey;

use crate::error::StoreError;
use crate::models::{AuthenticatorCredential, PasskeyUser, StoredChallenge};
use crate::utils::logging::LoggingHelper;

pub mod memory;

pub use memory::{InMemoryChallengeStore, InMemoryCredentialStore};

/// Holds one outstanding challenge per identity
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Store a challenge, replacing any earlier one for the same identity
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn put(&self, challenge: StoredChallenge) -> Result<(), StoreError>;

    /// Read the challenge for an identity without consuming it
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get(&self, identity: &str) -> Result<Option<StoredChallenge>, StoreError>;

    /// Remove and return the challenge for an identity in one step
    ///
    /// Concurrent callers for the same identity observe the challenge at most once.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn take(&self, identity: &str) -> Result<Option<StoredChallenge>, StoreError>;

    /// Delete the challenge for an identity (missing is not an error)
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn delete(&self, identity: &str) -> Result<(), StoreError>;

    /// Remove every challenge created at or before `cutoff`, returning how many went
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Holds passkey users and their registered credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert the user unless one already exists for its identity
    ///
    /// Returns the stored user, which is the existing one when present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the handle belongs to another identity.
    async fn create_user_if_absent(&self, user: PasskeyUser) -> Result<PasskeyUser, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn find_user(&self, identity: &str) -> Result<Option<PasskeyUser>, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<PasskeyUser>, StoreError>;

    /// Persist a new credential and link it to its owner
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the credential id is taken, or
    /// [`StoreError::NotFound`] if the owner has no user record.
    async fn insert_credential(&self, credential: AuthenticatorCredential)
        -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn find_credential(
        &self,
        credential_id: &str,
    ) -> Result<Option<AuthenticatorCredential>, StoreError>;

    /// All credentials owned by an identity
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn credentials_for(
        &self,
        identity: &str,
    ) -> Result<Vec<AuthenticatorCredential>, StoreError>;

    /// Compare-and-set the signature counter
    ///
    /// The update only applies while the stored counter still equals
    /// `expected`; returns whether it applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the credential does not exist.
    async fn update_counter(
        &self,
        credential_id: &str,
        expected: u32,
        new_counter: u32,
        public_key: Passkey,
        used_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Mark a credential as suspicious so later logins are refused
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the credential does not exist.
    async fn flag_for_review(&self, credential_id: &str) -> Result<(), StoreError>;
}

/// Periodically evict challenges older than `ttl`
///
/// Expired challenges are already treated as absent by the engine; the sweep
/// only keeps the store from growing with abandoned ceremonies.
pub fn spawn_challenge_sweeper(
    store: Arc<dyn ChallengeStore>,
    ttl: Duration,
    interval: StdDuration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now() - ttl).await {
                Ok(purged) => LoggingHelper::log_sweep_result(purged),
                Err(e) => log::error!("Challenge sweep failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CeremonyKind;

    #[tokio::test]
    async fn test_sweeper_evicts_stale_challenges() {
        let store = Arc::new(InMemoryChallengeStore::new());
        store
            .put(StoredChallenge {
                identity: "stale".to_string(),
                nonce: "n1".to_string(),
                kind: CeremonyKind::Registration,
                state: serde_json::Value::Null,
                created_at: Utc::now() - Duration::minutes(10),
            })
            .await
            .unwrap();
        store
            .put(StoredChallenge {
                identity: "fresh".to_string(),
                nonce: "n2".to_string(),
                kind: CeremonyKind::Authentication,
                state: serde_json::Value::Null,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let handle = spawn_challenge_sweeper(
            store.clone(),
            Duration::minutes(5),
            StdDuration::from_millis(10),
        );
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        handle.abort();

        assert!(store.get("stale").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
    }
}
