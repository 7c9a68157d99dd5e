use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::{PasskeyError, PasskeyResult};
use crate::models::{SessionClaims, SessionToken};
use crate::settings::PasskeyServerSettings;
use crate::utils::crypto::{create_jwt, verify_jwt, MIN_SECRET_LEN};
use crate::utils::logging::LoggingHelper;

/// Session issuer for signed, time-bound bearer tokens
///
/// Tokens are not persisted: a token is valid exactly when its HS256
/// signature matches the process secret and `exp` lies in the future.
#[derive(Clone)]
pub struct SessionIssuer {
    secret: Vec<u8>,
    ttl: Duration,
    issuer: String,
}

impl SessionIssuer {
    /// Create a new session issuer
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is shorter than 32 bytes or the ttl is
    /// not positive.
    pub fn new(secret: &[u8], ttl: Duration, issuer: &str) -> PasskeyResult<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(PasskeyError::Internal(format!(
                "session secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if ttl <= Duration::zero() {
            return Err(PasskeyError::Internal(
                "session ttl must be positive".to_string(),
            ));
        }

        Ok(Self {
            secret: secret.to_vec(),
            ttl,
            issuer: issuer.to_string(),
        })
    }

    /// Create a session issuer from the `session` settings section
    ///
    /// # Errors
    ///
    /// Returns an error if the configured secret or ttl is unusable.
    pub fn from_settings(settings: &PasskeyServerSettings) -> PasskeyResult<Self> {
        Self::new(
            settings.session.secret.as_bytes(),
            settings.session_ttl(),
            &settings.session.issuer,
        )
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `owner_identity`, valid from now
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, owner_identity: &str) -> PasskeyResult<SessionToken> {
        self.issue_at(owner_identity, Utc::now())
    }

    /// Mint a token as if the current time were `now`
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_at(&self, owner_identity: &str, now: DateTime<Utc>) -> PasskeyResult<SessionToken> {
        let expires_at = now + self.ttl;
        let claims = SessionClaims {
            sub: owner_identity.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        let payload = serde_json::to_value(&claims)?;
        let token = create_jwt(&payload, &self.secret)
            .map_err(|e| PasskeyError::Internal(format!("Failed to sign session token: {e}")))?;

        LoggingHelper::log_session_issued(owner_identity, claims.exp);

        Ok(SessionToken {
            token,
            owner_identity: owner_identity.to_string(),
            issued_at: timestamp_to_datetime(claims.iat)?,
            expires_at: timestamp_to_datetime(claims.exp)?,
        })
    }

    /// Check a token and return the identity it was issued for
    ///
    /// # Errors
    ///
    /// Returns [`PasskeyError::InvalidToken`] on a malformed token or bad
    /// signature, [`PasskeyError::TokenExpired`] once `exp` has passed.
    pub fn verify(&self, token: &str) -> PasskeyResult<String> {
        self.verify_at(token, Utc::now())
    }

    /// Check a token against an explicit current time
    ///
    /// # Errors
    ///
    /// Same as [`SessionIssuer::verify`].
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> PasskeyResult<String> {
        Ok(self.decode_claims(token, now)?.sub)
    }

    /// Verified claims of a token
    ///
    /// # Errors
    ///
    /// Same as [`SessionIssuer::verify`].
    pub fn decode_claims(&self, token: &str, now: DateTime<Utc>) -> PasskeyResult<SessionClaims> {
        let payload = verify_jwt(token, &self.secret).map_err(|e| {
            log::debug!("Session token rejected: {e}");
            PasskeyError::InvalidToken
        })?;

        let claims: SessionClaims =
            serde_json::from_value(payload).map_err(|_| PasskeyError::InvalidToken)?;

        if claims.iss != self.issuer {
            log::debug!("Session token issued by unexpected issuer {}", claims.iss);
            return Err(PasskeyError::InvalidToken);
        }
        if now.timestamp() >= claims.exp {
            return Err(PasskeyError::TokenExpired);
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("ttl", &self.ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

fn timestamp_to_datetime(timestamp: i64) -> PasskeyResult<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| PasskeyError::Internal(format!("timestamp {timestamp} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn issuer() -> SessionIssuer {
        SessionIssuer::new(SECRET, Duration::minutes(60), "passkey-server").unwrap()
    }

    #[test]
    fn test_issue_then_verify_returns_identity() {
        let issuer = issuer();
        let token = issuer.issue("user-1").unwrap();
        assert_eq!(token.owner_identity, "user-1");
        assert_eq!(issuer.verify(&token.token).unwrap(), "user-1");
        assert_eq!(token.expires_at - token.issued_at, Duration::minutes(60));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = issuer();
        let issued = Utc::now() - Duration::minutes(120);
        let token = issuer.issue_at("user-1", issued).unwrap();

        assert!(matches!(
            issuer.verify(&token.token),
            Err(PasskeyError::TokenExpired)
        ));
        // Still valid one second before expiry
        let just_before = issued + Duration::minutes(60) - Duration::seconds(1);
        assert_eq!(issuer.verify_at(&token.token, just_before).unwrap(), "user-1");
        // Expiry instant itself is already past
        let at_expiry = issued + Duration::minutes(60);
        assert!(matches!(
            issuer.verify_at(&token.token, at_expiry),
            Err(PasskeyError::TokenExpired)
        ));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let other = SessionIssuer::new(
            b"another-secret-another-secret-32",
            Duration::minutes(60),
            "passkey-server",
        )
        .unwrap();
        let token = other.issue("user-1").unwrap();
        assert!(matches!(
            issuer().verify(&token.token),
            Err(PasskeyError::InvalidToken)
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            issuer().verify("garbage"),
            Err(PasskeyError::InvalidToken)
        ));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let foreign = SessionIssuer::new(SECRET, Duration::minutes(60), "someone-else").unwrap();
        let token = foreign.issue("user-1").unwrap();
        assert!(matches!(
            issuer().verify(&token.token),
            Err(PasskeyError::InvalidToken)
        ));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(SessionIssuer::new(b"short", Duration::minutes(5), "x").is_err());
    }
}
