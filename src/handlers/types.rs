// Request and response bodies of the HTTP surface
use serde::{Deserialize, Serialize};
use webauthn_rs::prelude::{PublicKeyCredential, RegisterPublicKeyCredential};

use crate::models::UserSummary;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRegistrationBody {
    pub email: String,
    pub registration_options: RegisterPublicKeyCredential,
}

#[derive(Deserialize)]
pub struct LoginSetupBody {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLoginBody {
    pub email: String,
    pub authentication_options: PublicKeyCredential,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub message: String,
    pub user: UserSummary,
    pub credential_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub expires_at: i64,
    pub user: UserSummary,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionInfoResponse {
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}
