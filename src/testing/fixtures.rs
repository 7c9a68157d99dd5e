//! Test fixtures providing pre-built test objects
//!
//! [`TestFixtures::context`] wires a ceremony engine to in-memory stores, a
//! mock identity gateway and a software authenticator for the same relying
//! party, so a test can run complete ceremonies in a few lines.

use std::sync::Arc;

use crate::ceremony::CeremonyEngine;
use crate::error::PasskeyResult;
use crate::identity::RegistrationRequest;
use crate::models::AuthenticatorCredential;
use crate::settings::PasskeyServerSettings;
use crate::store::{InMemoryChallengeStore, InMemoryCredentialStore};

use super::authenticator::SoftAuthenticator;
use super::constants::{TEST_AUTH_URL, TEST_JWT_SECRET, TEST_RP_ID, TEST_RP_NAME};
use super::mock::MockIdentityGateway;

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Complete development settings for `localhost`
    #[must_use]
    pub fn settings() -> PasskeyServerSettings {
        let mut settings = PasskeyServerSettings::default();
        settings.relying_party.id = TEST_RP_ID.to_string();
        settings.relying_party.name = TEST_RP_NAME.to_string();
        settings.identity.base_url = TEST_AUTH_URL.to_string();
        settings.identity.request_timeout_seconds = 2;
        settings.session.secret = TEST_JWT_SECRET.to_string();
        settings
    }

    /// Fresh engine plus handles on everything behind it
    ///
    /// # Panics
    ///
    /// Panics if the fixture settings cannot build an engine.
    #[must_use]
    pub fn context() -> TestContext {
        Self::context_with_settings(&Self::settings())
    }

    /// Like [`TestFixtures::context`] with custom settings
    ///
    /// # Panics
    ///
    /// Panics if the settings cannot build an engine.
    #[must_use]
    pub fn context_with_settings(settings: &PasskeyServerSettings) -> TestContext {
        let challenges = Arc::new(InMemoryChallengeStore::new());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let gateway = Arc::new(MockIdentityGateway::new());

        let engine = CeremonyEngine::from_settings(
            settings,
            challenges.clone(),
            credentials.clone(),
            gateway.clone(),
        )
        .expect("fixture settings must build an engine");

        TestContext {
            engine: Arc::new(engine),
            challenges,
            credentials,
            gateway,
            authenticator: SoftAuthenticator::new(
                &settings.relying_party.id,
                &settings.expected_origin(),
            ),
        }
    }
}

/// Engine under test and its collaborators
pub struct TestContext {
    pub engine: Arc<CeremonyEngine>,
    pub challenges: Arc<InMemoryChallengeStore>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub gateway: Arc<MockIdentityGateway>,
    pub authenticator: SoftAuthenticator,
}

impl TestContext {
    /// Run a full registration for `email` with the software authenticator
    ///
    /// # Errors
    ///
    /// Returns the first ceremony error.
    ///
    /// # Panics
    ///
    /// Panics if the authenticator cannot produce a response.
    pub async fn register(&mut self, email: &str) -> PasskeyResult<AuthenticatorCredential> {
        let begin = self
            .engine
            .begin_registration(&RegistrationRequest::new(email, None))
            .await?;
        let response = self
            .authenticator
            .register(&begin.options)
            .expect("software authenticator must answer creation options");
        let registered = self.engine.finish_registration(email, &response).await?;
        Ok(registered.credential)
    }
}
