use actix_web::{http::header, web, HttpRequest, HttpResponse};

use super::types::SessionInfoResponse;
use crate::ceremony::CeremonyEngine;
use crate::error::PasskeyError;

/// Bearer token from the `Authorization` header, if present
#[must_use]
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// `GET /auth/session`: resolve a bearer token to its identity
///
/// # Errors
///
/// Returns an error if the token is missing, invalid or expired.
pub async fn session_info(
    req: HttpRequest,
    engine: web::Data<CeremonyEngine>,
) -> Result<HttpResponse, PasskeyError> {
    let token = bearer_token(&req).ok_or(PasskeyError::InvalidToken)?;
    let user_id = engine.verify_session(token)?;
    Ok(HttpResponse::Ok().json(SessionInfoResponse { user_id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_bearer_token_extraction() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("abc.def.ghi"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "bearer   xyz"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("xyz"));
    }

    #[test]
    fn test_non_bearer_schemes_ignored() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer "))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);
    }
}
