//! Testing utilities for the passkey server
//!
//! Available to unit tests and, with the `testing` feature, to integration
//! tests.
//!
//! - [`authenticator`] - software authenticator producing signed responses
//! - [`fixtures`] - settings and a fully wired engine
//! - [`mock`] - scripted identity gateway
//!
//! ## Usage
//!
//! ```rust,ignore
//! use passkey_server::testing::TestFixtures;
//!
//! let mut ctx = TestFixtures::context();
//! let credential = ctx.register("a@example.com").await?;
//! let options = ctx.engine.begin_authentication("a@example.com").await?;
//! let assertion = ctx.authenticator.authenticate(&options)?;
//! let login = ctx.engine.finish_authentication("a@example.com", &assertion).await?;
//! ```

pub mod authenticator;
pub mod fixtures;
pub mod mock;

pub use authenticator::SoftAuthenticator;
pub use fixtures::{TestContext, TestFixtures};
pub use mock::MockIdentityGateway;

/// Common test constants
pub mod constants {
    /// Relying-party id used by fixtures
    pub const TEST_RP_ID: &str = "localhost";

    pub const TEST_RP_NAME: &str = "Passkey Test";

    /// Origin a development browser reports for [`TEST_RP_ID`]
    pub const TEST_ORIGIN: &str = "http://localhost:5173";

    /// Identity gateway base URL; nothing listens there
    pub const TEST_AUTH_URL: &str = "http://127.0.0.1:9/api/v1";

    /// Session signing secret (256 bits)
    pub const TEST_JWT_SECRET: &str = "test_key_32_bytes_long_for_test_";

    /// Default test email address
    pub const TEST_EMAIL: &str = "a@example.com";
}
