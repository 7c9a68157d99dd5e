//! Mock objects and fake implementations for testing
//!
//! [`MockIdentityGateway`] stands in for the external identity service: it
//! hands out stable ids per email and can be switched into a failing mode.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{PasskeyError, PasskeyResult};
use crate::identity::{IdentityGateway, RegistrationRequest};
use crate::models::UserIdentity;

/// Scripted identity gateway
#[derive(Debug, Default)]
pub struct MockIdentityGateway {
    users: DashMap<String, UserIdentity>,
    next_id: AtomicUsize,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl MockIdentityGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            ..Self::default()
        }
    }

    /// Make every following call fail as if the service were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Pre-register an identity with a fixed id
    pub fn insert(&self, identity: UserIdentity) {
        self.users.insert(identity.email.to_lowercase(), identity);
    }

    /// Number of `resolve` calls seen so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityGateway for MockIdentityGateway {
    async fn resolve(&self, request: &RegistrationRequest) -> PasskeyResult<UserIdentity> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PasskeyError::IdentityUnavailable(
                "identity service unavailable".to_string(),
            ));
        }

        let key = request.email.trim().to_lowercase();
        let identity = self
            .users
            .entry(key.clone())
            .or_insert_with(|| UserIdentity {
                user_id: self.next_id.fetch_add(1, Ordering::SeqCst).to_string(),
                email: key,
                username: request
                    .username
                    .clone()
                    .unwrap_or_else(|| request.email.clone()),
            })
            .clone();
        Ok(identity)
    }
}
