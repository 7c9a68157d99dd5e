//! Records owned by the passkey core
//!
//! These are plain data-store records. Uniqueness (one challenge per identity,
//! one credential per id, one user per identity and handle) is enforced by the
//! store implementations, not by the types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use webauthn_rs::prelude::Passkey;
use webauthn_rs_proto::AuthenticatorTransport;

use crate::utils::validation::normalize_handle;

/// Canonical user record resolved by the identity gateway
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    pub email: String,
    pub username: String,
}

/// Local projection of a [`UserIdentity`] plus its registered credentials
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PasskeyUser {
    pub owner_identity: String,
    pub handle: String,
    /// Opaque id handed to authenticators as the `WebAuthn` user id
    pub user_handle: Uuid,
    /// Credential ids (base64url) registered to this user
    pub devices: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PasskeyUser {
    /// Create an empty user for a freshly resolved identity
    #[must_use]
    pub fn new(identity: &UserIdentity) -> Self {
        Self {
            owner_identity: identity.user_id.clone(),
            handle: normalize_handle(&identity.email),
            user_handle: Uuid::new_v4(),
            devices: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Client-facing view of a [`PasskeyUser`]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserSummary {
    pub user_id: String,
    pub email: String,
    pub devices: usize,
}

impl From<&PasskeyUser> for UserSummary {
    fn from(user: &PasskeyUser) -> Self {
        Self {
            user_id: user.owner_identity.clone(),
            email: user.handle.clone(),
            devices: user.devices.len(),
        }
    }
}

/// Which ceremony a stored challenge belongs to
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

/// Outstanding challenge for one identity
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoredChallenge {
    pub identity: String,
    /// Base64url challenge nonce as sent to the client
    pub nonce: String,
    pub kind: CeremonyKind,
    /// Serialised verifier state for the ceremony
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl StoredChallenge {
    /// A challenge is live until `created_at + ttl`
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.created_at + ttl <= now
    }
}

/// Registered authenticator public-key credential
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticatorCredential {
    /// Base64url credential id, unique across all users
    pub credential_id: String,
    pub owner_identity: String,
    /// Verifier record holding the COSE public key
    pub public_key: Passkey,
    pub sign_counter: u32,
    pub transports: Vec<AuthenticatorTransport>,
    pub flagged_for_review: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Signed, time-bound identity assertion handed out after login
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub owner_identity: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Claims carried inside a session token
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_identity_accepts_numeric_ids() {
        let identity: UserIdentity = serde_json::from_str(
            r#"{"user_id": 42, "email": "a@example.com", "username": "alice"}"#,
        )
        .unwrap();
        assert_eq!(identity.user_id, "42");

        let identity: UserIdentity = serde_json::from_str(
            r#"{"user_id": "u-42", "email": "a@example.com", "username": "alice"}"#,
        )
        .unwrap();
        assert_eq!(identity.user_id, "u-42");
    }

    #[test]
    fn test_passkey_user_starts_without_devices() {
        let identity = UserIdentity {
            user_id: "7".to_string(),
            email: "B@Example.com".to_string(),
            username: "bob".to_string(),
        };
        let user = PasskeyUser::new(&identity);
        assert_eq!(user.owner_identity, "7");
        assert_eq!(user.handle, "b@example.com");
        assert!(user.devices.is_empty());
    }

    #[test]
    fn test_challenge_expiry_boundary() {
        let now = Utc::now();
        let challenge = StoredChallenge {
            identity: "1".to_string(),
            nonce: "abc".to_string(),
            kind: CeremonyKind::Registration,
            state: serde_json::Value::Null,
            created_at: now - Duration::seconds(300),
        };
        assert!(challenge.is_expired(Duration::seconds(300), now));
        assert!(!challenge.is_expired(Duration::seconds(301), now));
    }
}
