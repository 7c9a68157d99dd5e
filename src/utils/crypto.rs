// Cryptographic helpers for compact HS256 tokens and base64url encoding

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted length for the HMAC signing secret (256 bits)
pub const MIN_SECRET_LEN: usize = 32;

/// Base64url (no padding) text of any value that serialises as a string
///
/// `WebAuthn` binary types serialise themselves as base64url, so going through
/// serde keeps ids and nonces byte-for-byte identical to what clients see.
///
/// # Errors
///
/// Returns an error if the value does not serialise to a JSON string.
pub fn base64url_text<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value).context("Failed to serialize binary value")? {
        serde_json::Value::String(text) => Ok(text),
        other => Err(anyhow!("Expected a base64url string, got {other}")),
    }
}

/// Create a JWT header for HS256
#[must_use]
pub fn create_jwt_header() -> serde_json::Value {
    serde_json::json!({
        "alg": "HS256",
        "typ": "JWT"
    })
}

/// Create a compact HS256 JWT: header.payload.signature
///
/// # Errors
///
/// Returns an error if:
/// - JSON serialization fails
/// - The HMAC key is rejected
pub fn create_jwt(payload: &serde_json::Value, secret: &[u8]) -> Result<String> {
    let header_json =
        serde_json::to_string(&create_jwt_header()).context("Failed to serialize JWT header")?;
    let payload_json = serde_json::to_string(payload).context("Failed to serialize JWT payload")?;

    let header_b64 = general_purpose::URL_SAFE_NO_PAD.encode(header_json.as_bytes());
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload_json.as_bytes());

    let message = format!("{header_b64}.{payload_b64}");
    let signature = sign_hmac_sha256(message.as_bytes(), secret)?;
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{message}.{signature_b64}"))
}

/// Check an HS256 JWT signature and return its decoded payload
///
/// The signature comparison is constant time. Expiry is left to the caller.
///
/// # Errors
///
/// Returns an error if:
/// - The token is not three dot-separated segments
/// - The header does not declare HS256
/// - The signature does not match
/// - The payload is not valid base64url JSON
pub fn verify_jwt(token: &str, secret: &[u8]) -> Result<serde_json::Value> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(anyhow!("Invalid JWT format"));
    };

    let header = decode_segment(header_b64).context("Invalid JWT header")?;
    if header["alg"] != "HS256" {
        return Err(anyhow!("Unsupported JWT algorithm"));
    }

    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .context("Invalid JWT signature encoding")?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|_| anyhow!("Invalid HMAC key length"))?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| anyhow!("JWT signature mismatch"))?;

    decode_segment(payload_b64).context("Invalid JWT payload")
}

fn decode_segment(segment: &str) -> Result<serde_json::Value> {
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .context("Base64 decode failed")?;
    serde_json::from_slice(&bytes).context("JSON parse failed")
}

fn sign_hmac_sha256(message: &[u8], secret: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|_| anyhow!("Invalid HMAC key length"))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEST_SECRET: &[u8] = b"test_secret_key_for_hmac_testing_32b";

    #[test]
    fn test_create_jwt_header() {
        let header = create_jwt_header();
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "JWT");
    }

    #[test]
    fn test_jwt_roundtrip() {
        let payload = json!({"sub": "42", "exp": 1});
        let token = create_jwt(&payload, TEST_SECRET).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = verify_jwt(&token, TEST_SECRET).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_jwt_wrong_secret_rejected() {
        let token = create_jwt(&json!({"sub": "42"}), TEST_SECRET).unwrap();
        let result = verify_jwt(&token, b"another_secret_key_that_is_32_bytes!");
        assert!(result.is_err());
    }

    #[test]
    fn test_jwt_tampered_payload_rejected() {
        let token = create_jwt(&json!({"sub": "42"}), TEST_SECRET).unwrap();
        let forged_payload = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"sub":"1"}"#);
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_payload;
        let forged = parts.join(".");

        assert!(verify_jwt(&forged, TEST_SECRET).is_err());
    }

    #[test]
    fn test_any_key_length_signs_and_verifies() {
        let secrets: [&[u8]; 3] = [b"", b"short", &[7u8; 100]];
        for secret in secrets {
            let token = create_jwt(&json!({"sub": "42"}), secret).unwrap();
            assert_eq!(verify_jwt(&token, secret).unwrap()["sub"], "42");
        }
    }

    #[test]
    fn test_jwt_malformed_rejected() {
        assert!(verify_jwt("not-a-jwt", TEST_SECRET).is_err());
        assert!(verify_jwt("a.b.c.d", TEST_SECRET).is_err());
    }

    #[test]
    fn test_base64url_text_of_string() {
        assert_eq!(base64url_text(&"abc").unwrap(), "abc");
        assert!(base64url_text(&42).is_err());
    }
}
