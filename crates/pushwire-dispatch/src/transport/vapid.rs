//! VAPID sender identification (RFC 8292).

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::SecretKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{decode_base64url, encode_base64url};
use crate::error::TransportError;
use pushwire_storage::VapidCredentials;

/// Lifetime of a signed VAPID token. RFC 8292 caps it at 24 hours.
pub const TOKEN_LIFETIME_SECS: i64 = 12 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct VapidClaims {
    pub aud: String,
    pub exp: i64,
    pub sub: String,
}

/// A freshly generated application server key pair, base64url encoded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidKeyPair {
    /// Uncompressed P-256 point (65 bytes).
    pub public_key: String,
    /// Raw private scalar (32 bytes).
    pub private_key: String,
}

/// Generates a new VAPID key pair.
#[must_use]
pub fn generate_vapid_keys() -> VapidKeyPair {
    let secret = SecretKey::random(&mut OsRng);
    let public = secret.public_key().to_encoded_point(false);
    VapidKeyPair {
        public_key: encode_base64url(public.as_bytes()),
        private_key: encode_base64url(secret.to_bytes()),
    }
}

/// Audience claim for an endpoint: its origin (scheme, host, non-default port).
pub fn audience(endpoint: &str) -> Result<String, TransportError> {
    let url = Url::parse(endpoint)
        .map_err(|e| TransportError::Vapid(format!("invalid endpoint '{endpoint}': {e}")))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(TransportError::Vapid(format!(
            "endpoint '{endpoint}' has no origin"
        )));
    }
    Ok(origin.ascii_serialization())
}

/// Builds the `Authorization` header value for a request to `endpoint`.
pub fn authorization(
    endpoint: &str,
    credentials: &VapidCredentials,
    now_unix: i64,
) -> Result<String, TransportError> {
    let claims = VapidClaims {
        aud: audience(endpoint)?,
        exp: now_unix + TOKEN_LIFETIME_SECS,
        sub: credentials.subject.clone(),
    };
    let token = sign(&claims, &credentials.private_key)?;
    Ok(format!("vapid t={token}, k={}", credentials.public_key))
}

fn sign(claims: &VapidClaims, private_key: &str) -> Result<String, TransportError> {
    let raw = decode_base64url(private_key)
        .map_err(|e| TransportError::Vapid(format!("invalid private key encoding: {e}")))?;
    let secret = SecretKey::from_slice(&raw)
        .map_err(|_| TransportError::Vapid("private key is not a P-256 scalar".into()))?;
    let der = secret
        .to_pkcs8_der()
        .map_err(|e| TransportError::Vapid(format!("cannot encode private key: {e}")))?;

    let key = EncodingKey::from_ec_der(der.as_bytes());
    jsonwebtoken::encode(&Header::new(Algorithm::ES256), claims, &key)
        .map_err(|e| TransportError::Vapid(e.to_string()))
}
