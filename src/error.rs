//! Error types for passkey ceremonies
//!
//! `PasskeyError` is the taxonomy every ceremony and session operation returns.
//! It maps onto HTTP status codes through [`actix_web::ResponseError`] so the
//! router never has to inspect error details itself.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Errors produced by the challenge and credential stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key (credential id, identity, handle) is already taken
    #[error("conflict: {0}")]
    Conflict(String),

    /// The record an update refers to does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialising or deserialising a stored record failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying engine failed
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors returned by ceremony and session operations
#[derive(Debug, Error)]
pub enum PasskeyError {
    /// The identity gateway is unreachable or rejected the handle
    #[error("identity service unavailable: {0}")]
    IdentityUnavailable(String),

    /// No live challenge for this identity (missing, expired or consumed)
    #[error("challenge not found")]
    ChallengeNotFound,

    /// A cryptographic or policy check failed; the reason is only logged
    #[error("verification failed")]
    VerificationFailed,

    /// No registered passkeys for the handle
    #[error("unknown user")]
    UnknownUser,

    /// The asserted credential is not registered to this user
    #[error("unknown credential")]
    UnknownCredential,

    /// The signature counter did not advance
    #[error("possible cloned authenticator detected")]
    PossibleCloneDetected,

    /// Session token is malformed or its signature does not match
    #[error("invalid token")]
    InvalidToken,

    /// Session token is past its expiry
    #[error("token expired")]
    TokenExpired,

    /// Request body failed validation before any ceremony work
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PasskeyError {
    /// Machine readable code used in HTTP error bodies
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            PasskeyError::IdentityUnavailable(_) => "identity_unavailable",
            PasskeyError::ChallengeNotFound => "challenge_not_found",
            // Unknown credentials are reported like any other failed check
            PasskeyError::VerificationFailed | PasskeyError::UnknownCredential => {
                "verification_failed"
            }
            PasskeyError::UnknownUser => "unknown_user",
            PasskeyError::PossibleCloneDetected => "possible_clone_detected",
            PasskeyError::InvalidToken => "invalid_token",
            PasskeyError::TokenExpired => "token_expired",
            PasskeyError::InvalidRequest(_) => "invalid_request",
            PasskeyError::Store(_) | PasskeyError::Internal(_) => "internal_error",
        }
    }

    /// Message that is safe to hand to clients
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            PasskeyError::IdentityUnavailable(_) => "User registration failed".to_string(),
            PasskeyError::ChallengeNotFound => "Challenge not found".to_string(),
            PasskeyError::VerificationFailed | PasskeyError::UnknownCredential => {
                "Verification failed".to_string()
            }
            PasskeyError::UnknownUser => "User not found".to_string(),
            PasskeyError::PossibleCloneDetected => {
                "Authenticator counter check failed".to_string()
            }
            PasskeyError::InvalidToken => "Invalid token".to_string(),
            PasskeyError::TokenExpired => "Token expired".to_string(),
            PasskeyError::InvalidRequest(msg) => msg.clone(),
            PasskeyError::Store(_) | PasskeyError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Whether the error is an unexpected failure rather than a client outcome
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, PasskeyError::Store(_) | PasskeyError::Internal(_))
    }
}

impl From<serde_json::Error> for PasskeyError {
    fn from(err: serde_json::Error) -> Self {
        PasskeyError::Internal(format!("serialization failed: {err}"))
    }
}

impl ResponseError for PasskeyError {
    fn status_code(&self) -> StatusCode {
        match self {
            PasskeyError::IdentityUnavailable(_)
            | PasskeyError::VerificationFailed
            | PasskeyError::UnknownCredential
            | PasskeyError::PossibleCloneDetected
            | PasskeyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PasskeyError::ChallengeNotFound | PasskeyError::UnknownUser => StatusCode::NOT_FOUND,
            PasskeyError::InvalidToken | PasskeyError::TokenExpired => StatusCode::UNAUTHORIZED,
            PasskeyError::Store(_) | PasskeyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_internal() {
            log::error!("Request failed with internal error: {self}");
        }

        HttpResponse::build(self.status_code()).json(json!({
            "error": self.error_code(),
            "message": self.public_message(),
        }))
    }
}

/// Result alias for ceremony operations
pub type PasskeyResult<T> = Result<T, PasskeyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_http_surface() {
        assert_eq!(
            PasskeyError::IdentityUnavailable("down".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PasskeyError::ChallengeNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(PasskeyError::UnknownUser.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            PasskeyError::PossibleCloneDetected.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PasskeyError::TokenExpired.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            PasskeyError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unknown_credential_is_not_revealed() {
        let err = PasskeyError::UnknownCredential;
        assert_eq!(err.error_code(), "verification_failed");
        assert_eq!(err.public_message(), "Verification failed");
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = PasskeyError::Store(StoreError::Backend("disk on fire".into()));
        assert!(err.is_internal());
        assert!(!err.public_message().contains("disk"));
    }
}
