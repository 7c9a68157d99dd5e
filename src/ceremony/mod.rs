//! Passkey ceremony engine
//!
//! Drives the two `WebAuthn` ceremonies on top of the challenge and credential
//! stores:
//!
//! - registration: [`CeremonyEngine::begin_registration`] /
//!   [`CeremonyEngine::finish_registration`]
//! - authentication: [`CeremonyEngine::begin_authentication`] /
//!   [`CeremonyEngine::finish_authentication`]
//!
//! Attestation and assertion parsing is delegated to `webauthn-rs`. The
//! engine owns the surrounding policy: one live challenge per identity,
//! at-most-once consumption, challenge expiry, signature counter
//! monotonicity and clone flagging.

mod authentication;
mod registration;

pub use authentication::LoginSession;
pub use registration::{RegisteredPasskey, RegistrationOptions};

use std::sync::Arc;

use chrono::{Duration, Utc};
use webauthn_rs::prelude::{Webauthn, WebauthnError};

use crate::error::{PasskeyError, PasskeyResult};
use crate::identity::IdentityGateway;
use crate::models::{CeremonyKind, PasskeyUser, StoredChallenge};
use crate::session::SessionIssuer;
use crate::settings::PasskeyServerSettings;
use crate::store::{ChallengeStore, CredentialStore};
use crate::utils::logging::LoggingHelper;
use crate::utils::validation::normalize_handle;

pub struct CeremonyEngine {
    webauthn: Arc<Webauthn>,
    challenges: Arc<dyn ChallengeStore>,
    credentials: Arc<dyn CredentialStore>,
    identity: Arc<dyn IdentityGateway>,
    sessions: Arc<SessionIssuer>,
    challenge_ttl: Duration,
}

impl CeremonyEngine {
    #[must_use]
    pub fn new(
        webauthn: Arc<Webauthn>,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialStore>,
        identity: Arc<dyn IdentityGateway>,
        sessions: Arc<SessionIssuer>,
        challenge_ttl: Duration,
    ) -> Self {
        Self {
            webauthn,
            challenges,
            credentials,
            identity,
            sessions,
            challenge_ttl,
        }
    }

    /// Build an engine with the verifier and session issuer described by `settings`
    ///
    /// # Errors
    ///
    /// Returns an error if the relying party or session secret is unusable.
    pub fn from_settings(
        settings: &PasskeyServerSettings,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialStore>,
        identity: Arc<dyn IdentityGateway>,
    ) -> PasskeyResult<Self> {
        let webauthn = settings
            .create_webauthn()
            .map_err(|e| PasskeyError::Internal(e.to_string()))?;
        let sessions = SessionIssuer::from_settings(settings)?;

        Ok(Self::new(
            Arc::new(webauthn),
            challenges,
            credentials,
            identity,
            Arc::new(sessions),
            settings.challenge_ttl(),
        ))
    }

    #[must_use]
    pub fn challenge_ttl(&self) -> Duration {
        self.challenge_ttl
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    /// Check a session token, returning the identity it belongs to
    ///
    /// # Errors
    ///
    /// Returns [`PasskeyError::InvalidToken`] or [`PasskeyError::TokenExpired`].
    pub fn verify_session(&self, token: &str) -> PasskeyResult<String> {
        self.sessions.verify(token)
    }

    /// Local user for a client supplied handle
    async fn user_for_handle(&self, handle: &str) -> PasskeyResult<Option<PasskeyUser>> {
        Ok(self
            .credentials
            .find_user_by_handle(&normalize_handle(handle))
            .await?)
    }

    /// Store a fresh challenge, replacing whatever the identity had outstanding
    async fn issue_challenge(
        &self,
        identity: &str,
        nonce: String,
        kind: CeremonyKind,
        state: serde_json::Value,
    ) -> PasskeyResult<()> {
        self.challenges
            .put(StoredChallenge {
                identity: identity.to_string(),
                nonce,
                kind,
                state,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Remove the identity's challenge and check that it is still usable
    ///
    /// The challenge leaves the store before any verification runs, so each
    /// one backs at most one attempt.
    async fn consume_challenge(
        &self,
        identity: &str,
        kind: CeremonyKind,
    ) -> PasskeyResult<StoredChallenge> {
        let ceremony = ceremony_name(kind);

        let Some(challenge) = self.challenges.take(identity).await? else {
            LoggingHelper::log_challenge_missing(ceremony, identity, false);
            return Err(PasskeyError::ChallengeNotFound);
        };

        if challenge.kind != kind {
            log::debug!(
                "Outstanding challenge for identity {identity} belongs to the {} ceremony",
                ceremony_name(challenge.kind)
            );
            return Err(PasskeyError::ChallengeNotFound);
        }

        if challenge.is_expired(self.challenge_ttl, Utc::now()) {
            LoggingHelper::log_challenge_missing(ceremony, identity, true);
            return Err(PasskeyError::ChallengeNotFound);
        }

        Ok(challenge)
    }
}

impl std::fmt::Debug for CeremonyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyEngine")
            .field("challenge_ttl", &self.challenge_ttl)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

fn ceremony_name(kind: CeremonyKind) -> &'static str {
    match kind {
        CeremonyKind::Registration => "registration",
        CeremonyKind::Authentication => "authentication",
    }
}

/// Map a verifier rejection to the opaque client error, logging the detail
fn verification_failure(
    kind: CeremonyKind,
    identity: &str,
    error: &WebauthnError,
) -> PasskeyError {
    LoggingHelper::log_verification_failure(ceremony_name(kind), identity, &error.to_string());
    PasskeyError::VerificationFailed
}
