//! Passkey request handlers
//!
//! Thin adapters between the HTTP bodies and [`CeremonyEngine`]; every error
//! is a [`PasskeyError`] and renders itself through `ResponseError`.

use actix_web::{web, HttpResponse};

use super::types::{
    LoginResponse, LoginSetupBody, UserResponse, VerifyLoginBody, VerifyRegistrationBody,
};
use crate::ceremony::CeremonyEngine;
use crate::error::PasskeyError;
use crate::identity::RegistrationRequest;
use crate::models::UserSummary;

/// `POST /auth/setup`: start a registration
///
/// # Errors
///
/// Returns an error if the identity gateway fails or options cannot be built.
pub async fn setup_passkey(
    engine: web::Data<CeremonyEngine>,
    body: web::Json<RegistrationRequest>,
) -> Result<HttpResponse, PasskeyError> {
    let options = engine.begin_registration(&body).await?;
    Ok(HttpResponse::Ok().json(options))
}

/// `POST /auth/verify`: finish a registration
///
/// # Errors
///
/// Returns an error if no challenge is outstanding or verification fails.
pub async fn verify_passkey(
    engine: web::Data<CeremonyEngine>,
    body: web::Json<VerifyRegistrationBody>,
) -> Result<HttpResponse, PasskeyError> {
    let registered = engine
        .finish_registration(&body.email, &body.registration_options)
        .await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        message: "Passkey registered".to_string(),
        user: UserSummary::from(&registered.user),
        credential_id: registered.credential.credential_id,
    }))
}

/// `POST /auth/login/setup`: start a login
///
/// # Errors
///
/// Returns an error if the user has no registered passkeys.
pub async fn authentication_options(
    engine: web::Data<CeremonyEngine>,
    body: web::Json<LoginSetupBody>,
) -> Result<HttpResponse, PasskeyError> {
    let options = engine.begin_authentication(&body.email).await?;
    Ok(HttpResponse::Ok().json(options))
}

/// `POST /auth/login/verify`: finish a login and hand out a session token
///
/// # Errors
///
/// Returns an error if no challenge is outstanding, the assertion does not
/// verify, or the signature counter did not advance.
pub async fn verify_authentication(
    engine: web::Data<CeremonyEngine>,
    body: web::Json<VerifyLoginBody>,
) -> Result<HttpResponse, PasskeyError> {
    let login = engine
        .finish_authentication(&body.email, &body.authentication_options)
        .await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        message: "Login successful".to_string(),
        token: login.token.token,
        expires_at: login.token.expires_at.timestamp(),
        user: UserSummary::from(&login.user),
    }))
}
