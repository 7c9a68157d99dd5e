use chrono::Utc;
use webauthn_rs::prelude::{
    Passkey, PasskeyAuthentication, PublicKeyCredential, RequestChallengeResponse, WebauthnError,
};

use super::{verification_failure, CeremonyEngine};
use crate::error::{PasskeyError, PasskeyResult};
use crate::models::{CeremonyKind, PasskeyUser, SessionToken};
use crate::utils::crypto::base64url_text;
use crate::utils::logging::LoggingHelper;

/// Result of a completed login
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: SessionToken,
    pub user: PasskeyUser,
}

/// A reported counter is acceptable when it advances, or when the
/// authenticator does not implement counters at all (both zero)
fn counter_advanced(stored: u32, reported: u32) -> bool {
    reported > stored || (stored == 0 && reported == 0)
}

impl CeremonyEngine {
    /// Start a passkey login for `handle`
    ///
    /// The returned options list every credential registered to the user
    /// together with its transports.
    ///
    /// # Errors
    ///
    /// - [`PasskeyError::UnknownUser`] if the handle has no registered passkeys
    /// - store and serialisation failures
    pub async fn begin_authentication(
        &self,
        handle: &str,
    ) -> PasskeyResult<RequestChallengeResponse> {
        let Some(user) = self.user_for_handle(handle).await? else {
            return Err(PasskeyError::UnknownUser);
        };
        let identity = user.owner_identity.as_str();

        let passkeys: Vec<Passkey> = self
            .credentials
            .credentials_for(identity)
            .await?
            .into_iter()
            .map(|credential| credential.public_key)
            .collect();
        if passkeys.is_empty() {
            return Err(PasskeyError::UnknownUser);
        }

        LoggingHelper::log_ceremony_started("authentication", identity);

        let (options, state) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| {
                PasskeyError::Internal(format!("Failed to create authentication options: {e}"))
            })?;

        let nonce = base64url_text(&options.public_key.challenge)
            .map_err(|e| PasskeyError::Internal(e.to_string()))?;
        self.issue_challenge(
            identity,
            nonce,
            CeremonyKind::Authentication,
            serde_json::to_value(&state)?,
        )
        .await?;

        Ok(options)
    }

    /// Verify an assertion, advance the signature counter and mint a session
    ///
    /// # Errors
    ///
    /// - [`PasskeyError::ChallengeNotFound`] if no live login challenge exists
    /// - [`PasskeyError::UnknownCredential`] if the asserted credential is not
    ///   registered to this user
    /// - [`PasskeyError::VerificationFailed`] on any signature or client data
    ///   mismatch
    /// - [`PasskeyError::PossibleCloneDetected`] if the counter did not advance
    ///   or the credential is already flagged
    /// - store and serialisation failures
    pub async fn finish_authentication(
        &self,
        handle: &str,
        response: &PublicKeyCredential,
    ) -> PasskeyResult<LoginSession> {
        let Some(user) = self.user_for_handle(handle).await? else {
            log::debug!("Authentication finish for unknown handle {handle}");
            return Err(PasskeyError::ChallengeNotFound);
        };
        let identity = user.owner_identity.as_str();

        let challenge = self
            .consume_challenge(identity, CeremonyKind::Authentication)
            .await?;
        let state: PasskeyAuthentication = serde_json::from_value(challenge.state)?;

        let credential_id = base64url_text(&response.raw_id)
            .map_err(|e| PasskeyError::Internal(e.to_string()))?;
        let stored = match self.credentials.find_credential(&credential_id).await? {
            Some(credential) if credential.owner_identity == identity => credential,
            _ => {
                LoggingHelper::log_verification_failure(
                    "authentication",
                    identity,
                    &format!("credential {credential_id} is not registered to this user"),
                );
                return Err(PasskeyError::UnknownCredential);
            }
        };

        if stored.flagged_for_review {
            log::warn!("Refusing login with credential {credential_id}: flagged for review");
            return Err(PasskeyError::PossibleCloneDetected);
        }

        let result = match self.webauthn.finish_passkey_authentication(response, &state) {
            Ok(result) => result,
            Err(WebauthnError::CredentialPossibleCompromise) => {
                return Err(self.reject_clone(&credential_id, stored.sign_counter, None).await);
            }
            Err(e) => {
                return Err(verification_failure(CeremonyKind::Authentication, identity, &e));
            }
        };

        let reported = result.counter();
        if !counter_advanced(stored.sign_counter, reported) {
            return Err(self
                .reject_clone(&credential_id, stored.sign_counter, Some(reported))
                .await);
        }

        let mut passkey = stored.public_key.clone();
        passkey.update_credential(&result);

        let applied = self
            .credentials
            .update_counter(
                &credential_id,
                stored.sign_counter,
                reported,
                passkey,
                Utc::now(),
            )
            .await?;
        if !applied {
            // Another login with this credential advanced the counter first
            return Err(self
                .reject_clone(&credential_id, stored.sign_counter, Some(reported))
                .await);
        }

        let token = self.sessions.issue(identity)?;
        LoggingHelper::log_ceremony_completed("authentication", identity, &credential_id);

        Ok(LoginSession { token, user })
    }

    /// Flag the credential and build the clone error
    async fn reject_clone(
        &self,
        credential_id: &str,
        stored: u32,
        reported: Option<u32>,
    ) -> PasskeyError {
        LoggingHelper::log_clone_detected(credential_id, stored, reported.unwrap_or(stored));
        if let Err(e) = self.credentials.flag_for_review(credential_id).await {
            log::error!("Failed to flag credential {credential_id} for review: {e}");
        }
        PasskeyError::PossibleCloneDetected
    }
}

#[cfg(test)]
mod tests {
    use super::counter_advanced;

    #[test]
    fn test_counter_must_advance() {
        assert!(counter_advanced(0, 1));
        assert!(counter_advanced(4, 5));
        assert!(!counter_advanced(5, 5));
        assert!(!counter_advanced(5, 4));
        assert!(!counter_advanced(3, 0));
    }

    #[test]
    fn test_zero_counters_tolerated() {
        assert!(counter_advanced(0, 0));
    }
}
