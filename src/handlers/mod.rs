// HTTP request handlers for the passkey ceremonies
pub mod passkey;
pub mod session;
pub mod types;

use actix_web::{web, HttpResponse, Result};

use crate::error::PasskeyError;
use types::HealthResponse;

// Re-export the main handler functions
pub use passkey::{authentication_options, setup_passkey, verify_authentication, verify_passkey};
pub use session::{bearer_token, session_info};

/// Health check endpoint
///
/// # Errors
/// Returns an error if health status cannot be determined
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: "Passkey server is running".to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Register every route of the passkey server
///
/// Expects a `web::Data<CeremonyEngine>` in the application data.
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    // Malformed bodies get the same structured error shape as ceremony failures
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        PasskeyError::InvalidRequest(format!("Malformed request body: {err}")).into()
    });

    cfg.app_data(json_config)
        // Registration
        .route("/auth/setup", web::post().to(setup_passkey))
        .route("/auth/verify", web::post().to(verify_passkey))
        // Authentication
        .route("/auth/login/setup", web::post().to(authentication_options))
        .route("/auth/login/verify", web::post().to(verify_authentication))
        // Session introspection
        .route("/auth/session", web::get().to(session_info))
        // Health endpoint
        .route("/ping", web::get().to(health));
}
