//! Software `WebAuthn` authenticator
//!
//! Produces genuinely signed ES256 registration and assertion responses so
//! the ceremony engine can be exercised end to end without a browser. Only
//! the "none" attestation format is emitted.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use ciborium::value::Value;
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde_json::json;
use webauthn_rs::prelude::{
    CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse,
};

use crate::utils::crypto::base64url_text;

const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;
const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;

struct SoftCredential {
    key_pair: EcdsaKeyPair,
    counter: u32,
}

/// In-process authenticator holding ES256 credentials for one relying party
pub struct SoftAuthenticator {
    rp_id: String,
    origin: String,
    rng: SystemRandom,
    credentials: HashMap<String, SoftCredential>,
    last_credential: Option<String>,
}

impl SoftAuthenticator {
    #[must_use]
    pub fn new(rp_id: &str, origin: &str) -> Self {
        Self {
            rp_id: rp_id.to_string(),
            origin: origin.to_string(),
            rng: SystemRandom::new(),
            credentials: HashMap::new(),
            last_credential: None,
        }
    }

    /// Report `origin` in client data from now on, keeping existing keys
    pub fn set_origin(&mut self, origin: &str) {
        self.origin = origin.to_string();
    }

    /// Base64url id of the most recently created credential
    #[must_use]
    pub fn last_credential_id(&self) -> Option<&str> {
        self.last_credential.as_deref()
    }

    /// Counter last reported for `credential_id`
    #[must_use]
    pub fn counter(&self, credential_id: &str) -> Option<u32> {
        self.credentials.get(credential_id).map(|c| c.counter)
    }

    /// Fresh random base64url challenge, unrelated to any issued one
    ///
    /// # Errors
    ///
    /// Returns an error if the system RNG fails.
    pub fn random_challenge(&self) -> Result<String> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| anyhow!("system RNG failure"))?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Create a credential answering the given creation options
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or encoding fails.
    pub fn register(
        &mut self,
        options: &CreationChallengeResponse,
    ) -> Result<RegisterPublicKeyCredential> {
        let challenge = base64url_text(&options.public_key.challenge)?;
        self.register_with_challenge(&challenge)
    }

    /// Create a credential signing an arbitrary challenge
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or encoding fails.
    pub fn register_with_challenge(
        &mut self,
        challenge: &str,
    ) -> Result<RegisterPublicKeyCredential> {
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &self.rng)
            .map_err(|_| anyhow!("key generation failed"))?;
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &self.rng)
                .map_err(|e| anyhow!("generated key rejected: {e}"))?;

        let mut raw_id = [0u8; 32];
        self.rng
            .fill(&mut raw_id)
            .map_err(|_| anyhow!("system RNG failure"))?;
        let credential_id = general_purpose::URL_SAFE_NO_PAD.encode(raw_id);

        let cose_key = cose_es256_key(key_pair.public_key().as_ref())?;

        let mut auth_data = self.rp_id_hash();
        auth_data.push(FLAG_USER_PRESENT | FLAG_USER_VERIFIED | FLAG_ATTESTED_CREDENTIAL);
        auth_data.extend_from_slice(&0u32.to_be_bytes());
        auth_data.extend_from_slice(&[0u8; 16]);
        let id_len = u16::try_from(raw_id.len()).context("credential id too long")?;
        auth_data.extend_from_slice(&id_len.to_be_bytes());
        auth_data.extend_from_slice(&raw_id);
        auth_data.extend_from_slice(&cose_key);

        let attestation_object = cbor_bytes(&Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(Vec::new())),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]))?;

        let client_data = self.client_data("webauthn.create", challenge)?;

        let response = json!({
            "id": credential_id,
            "rawId": credential_id,
            "type": "public-key",
            "response": {
                "attestationObject": general_purpose::URL_SAFE_NO_PAD.encode(attestation_object),
                "clientDataJSON": general_purpose::URL_SAFE_NO_PAD.encode(client_data),
                "transports": ["internal"],
            },
            "extensions": {},
        });

        self.credentials.insert(
            credential_id.clone(),
            SoftCredential {
                key_pair,
                counter: 0,
            },
        );
        self.last_credential = Some(credential_id);

        serde_json::from_value(response).context("registration response did not parse")
    }

    /// Sign the request options with the latest credential, advancing its counter by one
    ///
    /// # Errors
    ///
    /// Returns an error if no credential exists or signing fails.
    pub fn authenticate(
        &mut self,
        options: &RequestChallengeResponse,
    ) -> Result<PublicKeyCredential> {
        let credential_id = self
            .last_credential
            .clone()
            .ok_or_else(|| anyhow!("no credential registered"))?;
        let next = self
            .counter(&credential_id)
            .ok_or_else(|| anyhow!("unknown credential"))?
            .saturating_add(1);
        self.authenticate_with_counter(options, &credential_id, next)
    }

    /// Sign the request options with a chosen credential and counter value
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is unknown or signing fails.
    pub fn authenticate_with_counter(
        &mut self,
        options: &RequestChallengeResponse,
        credential_id: &str,
        counter: u32,
    ) -> Result<PublicKeyCredential> {
        let challenge = base64url_text(&options.public_key.challenge)?;
        self.assert_with_challenge(&challenge, credential_id, counter)
    }

    /// Sign an arbitrary challenge with a chosen credential and counter value
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is unknown or signing fails.
    pub fn assert_with_challenge(
        &mut self,
        challenge: &str,
        credential_id: &str,
        counter: u32,
    ) -> Result<PublicKeyCredential> {
        let mut auth_data = self.rp_id_hash();
        auth_data.push(FLAG_USER_PRESENT | FLAG_USER_VERIFIED);
        auth_data.extend_from_slice(&counter.to_be_bytes());

        let client_data = self.client_data("webauthn.get", challenge)?;
        let client_data_hash = digest(&SHA256, &client_data);

        let mut signed = auth_data.clone();
        signed.extend_from_slice(client_data_hash.as_ref());

        let credential = self
            .credentials
            .get_mut(credential_id)
            .ok_or_else(|| anyhow!("unknown credential {credential_id}"))?;
        let signature = credential
            .key_pair
            .sign(&self.rng, &signed)
            .map_err(|_| anyhow!("signing failed"))?;
        credential.counter = counter;

        let response = json!({
            "id": credential_id,
            "rawId": credential_id,
            "type": "public-key",
            "response": {
                "authenticatorData": general_purpose::URL_SAFE_NO_PAD.encode(auth_data),
                "clientDataJSON": general_purpose::URL_SAFE_NO_PAD.encode(client_data),
                "signature": general_purpose::URL_SAFE_NO_PAD.encode(signature.as_ref()),
                "userHandle": null,
            },
            "extensions": {},
        });

        serde_json::from_value(response).context("assertion response did not parse")
    }

    fn rp_id_hash(&self) -> Vec<u8> {
        digest(&SHA256, self.rp_id.as_bytes()).as_ref().to_vec()
    }

    fn client_data(&self, ceremony_type: &str, challenge: &str) -> Result<Vec<u8>> {
        serde_json::to_vec(&json!({
            "type": ceremony_type,
            "challenge": challenge,
            "origin": self.origin,
            "crossOrigin": false,
        }))
        .context("client data serialisation failed")
    }
}

impl std::fmt::Debug for SoftAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftAuthenticator")
            .field("rp_id", &self.rp_id)
            .field("origin", &self.origin)
            .field("credentials", &self.credentials.len())
            .finish_non_exhaustive()
    }
}

/// COSE_Key map for an uncompressed P-256 point (0x04 || x || y)
fn cose_es256_key(public_key: &[u8]) -> Result<Vec<u8>> {
    if public_key.len() != 65 || public_key[0] != 0x04 {
        return Err(anyhow!("expected an uncompressed P-256 point"));
    }
    let x = public_key[1..33].to_vec();
    let y = public_key[33..65].to_vec();

    cbor_bytes(&Value::Map(vec![
        (int(1), int(2)),
        (int(3), int(-7)),
        (int(-1), int(1)),
        (int(-2), Value::Bytes(x)),
        (int(-3), Value::Bytes(y)),
    ]))
}

fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

fn cbor_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| anyhow!("CBOR encoding failed: {e:?}"))?;
    Ok(out)
}
