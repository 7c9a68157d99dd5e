//! Identity gateway client
//!
//! The passkey core never owns account data. Registration hands the handle
//! fields to an external identity service which creates or resolves the
//! canonical user and returns its stable id.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PasskeyError, PasskeyResult};
use crate::models::UserIdentity;
use crate::settings::PasskeyServerSettings;
use crate::utils::logging::LoggingHelper;

/// Handle fields sent by clients when starting a registration
///
/// Unknown fields are forwarded to the identity service untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RegistrationRequest {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RegistrationRequest {
    #[must_use]
    pub fn new(email: &str, username: Option<&str>) -> Self {
        Self {
            email: email.to_string(),
            username: username.map(str::to_string),
            extra: serde_json::Map::new(),
        }
    }
}

/// Response envelope of `POST /users`
#[derive(Deserialize, Debug)]
struct IdentityEnvelope {
    user: UserIdentity,
}

/// Resolves or creates the canonical identity for a handle
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// # Errors
    ///
    /// Returns [`PasskeyError::IdentityUnavailable`] if the service cannot be
    /// reached, rejects the handle, or answers with an unusable body.
    async fn resolve(&self, request: &RegistrationRequest) -> PasskeyResult<UserIdentity>;
}

/// `IdentityGateway` backed by the HTTP identity service
#[derive(Clone, Debug)]
pub struct HttpIdentityGateway {
    client: reqwest::Client,
    users_url: String,
}

impl HttpIdentityGateway {
    /// Create a gateway for `base_url` (including any API prefix)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> PasskeyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PasskeyError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            users_url: format!("{}/users", base_url.trim_end_matches('/')),
        })
    }

    /// Create a gateway from the `identity` settings section
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_settings(settings: &PasskeyServerSettings) -> PasskeyResult<Self> {
        Self::new(
            &settings.identity.base_url,
            Duration::from_secs(settings.identity.request_timeout_seconds),
        )
    }

    #[must_use]
    pub fn users_url(&self) -> &str {
        &self.users_url
    }
}

#[async_trait]
impl IdentityGateway for HttpIdentityGateway {
    async fn resolve(&self, request: &RegistrationRequest) -> PasskeyResult<UserIdentity> {
        log::debug!("Resolving identity for {} via {}", request.email, self.users_url);

        let response = self
            .client
            .post(&self.users_url)
            .json(request)
            .send()
            .await
            .map_err(|e| unavailable(&format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(unavailable(&format!(
                "identity service answered with status {}",
                response.status()
            )));
        }

        let envelope: IdentityEnvelope = response
            .json()
            .await
            .map_err(|e| unavailable(&format!("malformed identity response: {e}")))?;

        if envelope.user.user_id.is_empty() {
            return Err(unavailable("identity response carried an empty user id"));
        }

        Ok(envelope.user)
    }
}

fn unavailable(reason: &str) -> PasskeyError {
    LoggingHelper::log_gateway_failure(reason);
    PasskeyError::IdentityUnavailable(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_users_url_joins_base() {
        let gateway =
            HttpIdentityGateway::new("http://auth.local/api/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(gateway.users_url(), "http://auth.local/api/v1/users");
    }

    #[test]
    fn test_registration_request_keeps_extra_fields() {
        let request: RegistrationRequest = serde_json::from_str(
            r#"{"email": "a@example.com", "username": "alice", "firstName": "Alice"}"#,
        )
        .unwrap();
        assert_eq!(request.username.as_deref(), Some("alice"));
        assert_eq!(request.extra["firstName"], "Alice");

        let forwarded = serde_json::to_value(&request).unwrap();
        assert_eq!(forwarded["firstName"], "Alice");
        assert_eq!(forwarded["email"], "a@example.com");
    }

    #[test]
    fn test_envelope_requires_user() {
        assert!(serde_json::from_str::<IdentityEnvelope>(r#"{"id": 1}"#).is_err());
        let envelope: IdentityEnvelope = serde_json::from_str(
            r#"{"user": {"user_id": 9, "email": "a@example.com", "username": "a"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.user.user_id, "9");
    }
}
