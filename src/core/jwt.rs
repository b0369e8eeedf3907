//! Locally signed bearer assertions from a personal access credential.
//!
//! The credential carries an Ed25519 private JWK plus issuer, subject and
//! audience claims. Assertions are EdDSA-signed compact JWTs valid for 24
//! hours; they are never refreshed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signer, SigningKey};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

pub const ASSERTION_VALIDITY_HOURS: i64 = 24;

/// Personal access credential file contents.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessCredential {
    pub url: String,
    pub jwk: Value,
    pub issuer: String,
    pub username: String,
    pub audience: String,
    /// Present in cached profiles; credential files usually omit it.
    #[serde(default)]
    pub project: Option<String>,
}

impl AccessCredential {
    pub fn parse(content: &[u8], source: &str) -> Result<Self> {
        serde_json::from_slice(content).map_err(|e| {
            Error::auth_configuration(format!("Invalid access credential {}: {}", source, e))
        })
    }
}

fn decode_b64(value: &str, field: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| Error::auth_configuration(format!("Invalid JWK field '{}': {}", field, e)))
}

fn signing_key(jwk: &Value) -> Result<SigningKey> {
    let field = |name: &str| jwk.get(name).and_then(Value::as_str);

    if field("kty") != Some("OKP") || field("crv") != Some("Ed25519") {
        return Err(Error::auth_configuration(
            "Access credential key must be an Ed25519 OKP JWK",
        ));
    }

    let private = field("d")
        .ok_or_else(|| Error::auth_configuration("Access credential JWK has no private key ('d')"))?;
    let bytes = decode_b64(private, "d")?;
    let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        Error::auth_configuration(format!(
            "Ed25519 private key must be 32 bytes, got {}",
            bytes.len()
        ))
    })?;

    Ok(SigningKey::from_bytes(&secret))
}

/// Mint a compact EdDSA JWT for `credential`, issued at `issued_at`.
pub fn mint_assertion(credential: &AccessCredential, issued_at: DateTime<Utc>) -> Result<String> {
    let key = signing_key(&credential.jwk)?;

    let mut header = json!({ "alg": "EdDSA", "typ": "JWT" });
    if let Some(kid) = credential.jwk.get("kid").and_then(Value::as_str) {
        header["kid"] = Value::String(kid.to_string());
    }

    let expires_at = issued_at + Duration::hours(ASSERTION_VALIDITY_HOURS);
    let claims = json!({
        "iss": credential.issuer,
        "sub": credential.username,
        "aud": credential.audience,
        "iat": issued_at.timestamp(),
        "exp": expires_at.timestamp(),
    });

    let encode = |value: &Value| -> Result<String> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| Error::internal_json(e.to_string(), Some("encode assertion".to_string())))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    };

    let signing_input = format!("{}.{}", encode(&header)?, encode(&claims)?);
    let signature = key.sign(signing_input.as_bytes());

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}
