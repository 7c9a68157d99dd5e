#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the passkey server
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ceremony;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod session;
pub mod settings;
pub mod store;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use ceremony::CeremonyEngine;
pub use error::{PasskeyError, PasskeyResult, StoreError};
pub use handlers::configure_services;
pub use identity::{HttpIdentityGateway, IdentityGateway, RegistrationRequest};
pub use session::SessionIssuer;
pub use settings::PasskeyServerSettings;
pub use store::{
    spawn_challenge_sweeper, ChallengeStore, CredentialStore, InMemoryChallengeStore,
    InMemoryCredentialStore,
};
