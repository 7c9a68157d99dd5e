use chrono::Utc;
use serde::Serialize;
use webauthn_rs::prelude::{
    CreationChallengeResponse, Credential, CredentialID, PasskeyRegistration,
    RegisterPublicKeyCredential,
};

use super::{verification_failure, CeremonyEngine};
use crate::error::{PasskeyError, PasskeyResult, StoreError};
use crate::identity::RegistrationRequest;
use crate::models::{AuthenticatorCredential, CeremonyKind, PasskeyUser};
use crate::utils::crypto::base64url_text;
use crate::utils::logging::LoggingHelper;
use crate::utils::validation::is_valid_email;

/// Creation options handed to the client, together with its canonical handle
#[derive(Serialize, Debug)]
pub struct RegistrationOptions {
    pub email: String,
    pub options: CreationChallengeResponse,
}

/// Result of a completed registration
#[derive(Debug, Clone)]
pub struct RegisteredPasskey {
    pub user: PasskeyUser,
    pub credential: AuthenticatorCredential,
}

impl CeremonyEngine {
    /// Start a passkey registration
    ///
    /// Resolves the canonical identity through the identity gateway, creates
    /// the local user on first use and stores a fresh registration challenge,
    /// replacing any challenge the identity still had outstanding.
    ///
    /// # Errors
    ///
    /// - [`PasskeyError::InvalidRequest`] if the email is malformed
    /// - [`PasskeyError::IdentityUnavailable`] if the gateway fails, or the
    ///   handle already belongs to another identity
    /// - store and serialisation failures
    pub async fn begin_registration(
        &self,
        request: &RegistrationRequest,
    ) -> PasskeyResult<RegistrationOptions> {
        let email = request.email.trim();
        if !is_valid_email(email) {
            return Err(PasskeyError::InvalidRequest(
                "A valid email address is required".to_string(),
            ));
        }

        let identity = self.identity.resolve(request).await?;
        LoggingHelper::log_ceremony_started("registration", &identity.user_id);

        let user = match self
            .credentials
            .create_user_if_absent(PasskeyUser::new(&identity))
            .await
        {
            Ok(user) => user,
            Err(StoreError::Conflict(reason)) => {
                log::warn!("Refusing registration for identity {}: {reason}", identity.user_id);
                return Err(PasskeyError::IdentityUnavailable(reason));
            }
            Err(e) => return Err(e.into()),
        };

        let existing: Vec<CredentialID> = self
            .credentials
            .credentials_for(&user.owner_identity)
            .await?
            .iter()
            .map(|credential| credential.public_key.cred_id().clone())
            .collect();
        let exclude = if existing.is_empty() {
            None
        } else {
            Some(existing)
        };

        let display_name = if identity.username.is_empty() {
            user.handle.as_str()
        } else {
            identity.username.as_str()
        };

        let (options, state) = self
            .webauthn
            .start_passkey_registration(user.user_handle, &user.handle, display_name, exclude)
            .map_err(|e| {
                PasskeyError::Internal(format!("Failed to create registration options: {e}"))
            })?;

        let nonce = base64url_text(&options.public_key.challenge)
            .map_err(|e| PasskeyError::Internal(e.to_string()))?;
        self.issue_challenge(
            &user.owner_identity,
            nonce,
            CeremonyKind::Registration,
            serde_json::to_value(&state)?,
        )
        .await?;

        Ok(RegistrationOptions {
            email: user.handle,
            options,
        })
    }

    /// Verify an attestation response and persist the new credential
    ///
    /// # Errors
    ///
    /// - [`PasskeyError::ChallengeNotFound`] if the handle has no live
    ///   registration challenge (never issued, expired or already consumed)
    /// - [`PasskeyError::VerificationFailed`] on any attestation mismatch
    /// - store and serialisation failures
    pub async fn finish_registration(
        &self,
        handle: &str,
        response: &RegisterPublicKeyCredential,
    ) -> PasskeyResult<RegisteredPasskey> {
        let Some(user) = self.user_for_handle(handle).await? else {
            log::debug!("Registration finish for unknown handle {handle}");
            return Err(PasskeyError::ChallengeNotFound);
        };
        let owner = user.owner_identity.clone();
        let identity = owner.as_str();

        let challenge = self
            .consume_challenge(identity, CeremonyKind::Registration)
            .await?;
        let state: PasskeyRegistration = serde_json::from_value(challenge.state)?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(response, &state)
            .map_err(|e| verification_failure(CeremonyKind::Registration, identity, &e))?;

        let credential_id = base64url_text(passkey.cred_id())
            .map_err(|e| PasskeyError::Internal(e.to_string()))?;
        let sign_counter = Credential::from(passkey.clone()).counter;

        let credential = AuthenticatorCredential {
            credential_id: credential_id.clone(),
            owner_identity: identity.to_string(),
            public_key: passkey,
            sign_counter,
            transports: response.response.transports.clone().unwrap_or_default(),
            flagged_for_review: false,
            created_at: Utc::now(),
            last_used_at: None,
        };

        match self.credentials.insert_credential(credential.clone()).await {
            Ok(()) => {}
            Err(StoreError::Conflict(reason)) => {
                LoggingHelper::log_verification_failure("registration", identity, &reason);
                return Err(PasskeyError::VerificationFailed);
            }
            Err(e) => return Err(e.into()),
        }

        let user = self
            .credentials
            .find_user(identity)
            .await?
            .unwrap_or(user);

        LoggingHelper::log_ceremony_completed("registration", identity, &credential_id);
        Ok(RegisteredPasskey { user, credential })
    }
}
