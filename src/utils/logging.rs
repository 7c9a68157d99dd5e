// Centralized logging for ceremony events
use log::{debug, info, warn};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log the start of a ceremony
    pub fn log_ceremony_started(ceremony: &str, identity: &str) {
        info!("🔐 {ceremony} ceremony started for identity {identity}");
    }

    /// Log a completed ceremony
    pub fn log_ceremony_completed(ceremony: &str, identity: &str, credential_id: &str) {
        info!("✅ {ceremony} ceremony completed for identity {identity} (credential {credential_id})");
    }

    /// Log why a verification failed; clients only ever see a generic error
    pub fn log_verification_failure(ceremony: &str, identity: &str, reason: &str) {
        warn!("❌ {ceremony} verification failed for identity {identity}: {reason}");
    }

    /// Log a finish call that found no live challenge
    pub fn log_challenge_missing(ceremony: &str, identity: &str, expired: bool) {
        if expired {
            debug!("{ceremony} challenge for identity {identity} had expired");
        } else {
            debug!("No {ceremony} challenge outstanding for identity {identity}");
        }
    }

    /// Log a signature counter regression
    pub fn log_clone_detected(credential_id: &str, stored: u32, reported: u32) {
        warn!(
            "🚨 Possible cloned authenticator: credential {credential_id} reported counter {reported} (stored {stored}); flagged for review"
        );
    }

    /// Log an identity gateway failure
    pub fn log_gateway_failure(reason: &str) {
        warn!("Identity gateway request failed: {reason}");
    }

    /// Log a session token being issued
    pub fn log_session_issued(identity: &str, expires_at: i64) {
        info!("Issued session token for identity {identity} (expires at {expires_at})");
    }

    /// Log the outcome of an expiry sweep
    pub fn log_sweep_result(purged: usize) {
        if purged > 0 {
            info!("🧹 Evicted {purged} expired challenge(s)");
        } else {
            debug!("Challenge sweep found nothing to evict");
        }
    }
}
