//! `aes128gcm` message encryption for web push (RFC 8291 over RFC 8188).
//!
//! Every message is a single record: a fresh ephemeral P-256 key and a random
//! salt are generated per call, so the same payload never encrypts to the same
//! bytes twice.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use p256::PublicKey;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

use super::decode_base64url;
use crate::error::TransportError;

/// Record size advertised in the content coding header.
pub const RECORD_SIZE: u32 = 4096;

const SALT_LEN: usize = 16;
const AUTH_SECRET_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const TAG_LEN: usize = 16;

/// salt (16) + record size (4) + key id length (1) + key id (65)
pub const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;

/// Largest plaintext that still fits a 4096 byte push message body.
pub const MAX_PAYLOAD_LEN: usize = 4096 - HEADER_LEN - TAG_LEN - 1;

/// Padding delimiter that marks the last (and only) record.
const LAST_RECORD_DELIMITER: u8 = 0x02;

const KEY_INFO_PREFIX: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// Encrypts `plaintext` for the subscriber owning `p256dh`/`auth`.
pub fn encrypt(p256dh: &str, auth: &str, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
    if plaintext.len() > MAX_PAYLOAD_LEN {
        return Err(TransportError::Encryption(format!(
            "payload is {} bytes, limit is {MAX_PAYLOAD_LEN}",
            plaintext.len()
        )));
    }

    let ua_public_bytes = decode_base64url(p256dh)
        .map_err(|e| TransportError::Encryption(format!("invalid p256dh key: {e}")))?;
    let auth_secret = decode_base64url(auth)
        .map_err(|e| TransportError::Encryption(format!("invalid auth secret: {e}")))?;
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(TransportError::Encryption(format!(
            "auth secret must be {AUTH_SECRET_LEN} bytes, got {}",
            auth_secret.len()
        )));
    }

    let ua_public = PublicKey::from_sec1_bytes(&ua_public_bytes)
        .map_err(|_| TransportError::Encryption("p256dh is not a valid P-256 point".into()))?;
    let ua_public_point = ua_public.to_encoded_point(false);

    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let as_public_point = ephemeral.public_key().to_encoded_point(false);
    let shared = ephemeral.diffie_hellman(&ua_public);

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    seal(
        plaintext,
        &Keying {
            ua_public: ua_public_point.as_bytes(),
            as_public: as_public_point.as_bytes(),
            auth_secret: &auth_secret,
            ecdh_secret: shared.raw_secret_bytes().as_slice(),
        },
        salt,
    )
}

/// Key material for one message.
pub(crate) struct Keying<'a> {
    /// Uncompressed user agent public key.
    pub ua_public: &'a [u8],
    /// Uncompressed application server (ephemeral) public key.
    pub as_public: &'a [u8],
    pub auth_secret: &'a [u8],
    pub ecdh_secret: &'a [u8],
}

/// Content encryption key and nonce for one record.
pub(crate) struct RecordKeys {
    pub cek: [u8; 16],
    pub nonce: [u8; 12],
}

pub(crate) fn derive_record_keys(
    keying: &Keying<'_>,
    salt: &[u8],
) -> Result<RecordKeys, TransportError> {
    let hkdf_error = |_| TransportError::Encryption("HKDF output length rejected".into());

    let mut key_info =
        Vec::with_capacity(KEY_INFO_PREFIX.len() + keying.ua_public.len() + keying.as_public.len());
    key_info.extend_from_slice(KEY_INFO_PREFIX);
    key_info.extend_from_slice(keying.ua_public);
    key_info.extend_from_slice(keying.as_public);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(keying.auth_secret), keying.ecdh_secret)
        .expand(&key_info, &mut ikm)
        .map_err(hkdf_error)?;

    let prk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut keys = RecordKeys {
        cek: [0u8; 16],
        nonce: [0u8; 12],
    };
    prk.expand(CEK_INFO, &mut keys.cek).map_err(hkdf_error)?;
    prk.expand(NONCE_INFO, &mut keys.nonce).map_err(hkdf_error)?;
    Ok(keys)
}

fn seal(
    plaintext: &[u8],
    keying: &Keying<'_>,
    salt: [u8; SALT_LEN],
) -> Result<Vec<u8>, TransportError> {
    let keys = derive_record_keys(keying, &salt)?;

    let mut record = Vec::with_capacity(plaintext.len() + 1);
    record.extend_from_slice(plaintext);
    record.push(LAST_RECORD_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(&keys.cek)
        .map_err(|_| TransportError::Encryption("invalid content encryption key".into()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&keys.nonce), record.as_slice())
        .map_err(|_| TransportError::Encryption("AES-GCM encryption failed".into()))?;

    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(keying.as_public);
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::encode_base64url;
    use p256::SecretKey;

    /// A browser-side key pair and auth secret.
    pub(crate) struct UserAgent {
        pub secret: SecretKey,
        pub p256dh: String,
        pub auth: String,
    }

    impl UserAgent {
        pub(crate) fn generate() -> Self {
            let secret = SecretKey::random(&mut OsRng);
            let public = secret.public_key().to_encoded_point(false);
            let mut auth = [0u8; AUTH_SECRET_LEN];
            OsRng.fill_bytes(&mut auth);
            Self {
                p256dh: encode_base64url(public.as_bytes()),
                auth: encode_base64url(auth),
                secret,
            }
        }

        /// Decrypts a message body the way a browser does.
        pub(crate) fn decrypt(&self, body: &[u8]) -> Vec<u8> {
            let salt = &body[..SALT_LEN];
            let record_size = u32::from_be_bytes(body[16..20].try_into().unwrap());
            assert_eq!(record_size, RECORD_SIZE);
            let id_len = body[20] as usize;
            let as_public = &body[21..21 + id_len];
            let ciphertext = &body[21 + id_len..];

            let as_key = PublicKey::from_sec1_bytes(as_public).unwrap();
            let shared = p256::ecdh::diffie_hellman(
                self.secret.to_nonzero_scalar(),
                as_key.as_affine(),
            );
            let ua_public = self.secret.public_key().to_encoded_point(false);
            let auth = crate::transport::decode_base64url(&self.auth).unwrap();

            let keys = derive_record_keys(
                &Keying {
                    ua_public: ua_public.as_bytes(),
                    as_public,
                    auth_secret: &auth,
                    ecdh_secret: shared.raw_secret_bytes().as_slice(),
                },
                salt,
            )
            .unwrap();

            let mut record = Aes128Gcm::new_from_slice(&keys.cek)
                .unwrap()
                .decrypt(Nonce::from_slice(&keys.nonce), ciphertext)
                .unwrap();
            assert_eq!(record.pop(), Some(LAST_RECORD_DELIMITER));
            record
        }
    }

    #[test]
    fn test_browser_can_decrypt() {
        let ua = UserAgent::generate();
        let message = br#"{"title":"Deploy finished","body":"v1.4.2 is live"}"#;

        let body = encrypt(&ua.p256dh, &ua.auth, message).unwrap();
        assert_eq!(body.len(), HEADER_LEN + message.len() + 1 + TAG_LEN);
        assert_eq!(ua.decrypt(&body), message);
    }

    #[test]
    fn test_each_message_uses_fresh_salt_and_key() {
        let ua = UserAgent::generate();
        let first = encrypt(&ua.p256dh, &ua.auth, b"same").unwrap();
        let second = encrypt(&ua.p256dh, &ua.auth, b"same").unwrap();
        assert_ne!(first[..SALT_LEN], second[..SALT_LEN]);
        assert_ne!(first[21..HEADER_LEN], second[21..HEADER_LEN]);
    }

    #[test]
    fn test_rejects_bad_client_keys() {
        let ua = UserAgent::generate();
        let short_auth = encode_base64url([1u8; 8]);
        assert!(matches!(
            encrypt(&ua.p256dh, &short_auth, b"x"),
            Err(TransportError::Encryption(_))
        ));

        let not_a_point = encode_base64url([4u8; 65]);
        assert!(matches!(
            encrypt(&not_a_point, &ua.auth, b"x"),
            Err(TransportError::Encryption(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let ua = UserAgent::generate();
        let payload = vec![b'a'; MAX_PAYLOAD_LEN + 1];
        assert!(encrypt(&ua.p256dh, &ua.auth, &payload).is_err());
        let payload = vec![b'a'; MAX_PAYLOAD_LEN];
        let body = encrypt(&ua.p256dh, &ua.auth, &payload).unwrap();
        assert_eq!(body.len(), 4096);
    }

    /// RFC 8291 Appendix A.
    mod rfc8291_example {
        pub const PLAINTEXT: &[u8] = b"When I grow up, I want to be a watermelon";
        pub const AS_PRIVATE: &str = "yfWPiYE-n46HLnH0KqZOF1fJJU3MYrct3AELtAQ-oRw";
        pub const AS_PUBLIC: &str = "BP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLocInmYWAmS6TlzAC8wEqKK6PBru3jl7A8";
        pub const UA_PRIVATE: &str = "q1dXpw3UpT5VOmu_cf_v6ih07Aems3njxI-JWgLcM94";
        pub const UA_PUBLIC: &str = "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4";
        pub const SALT: &str = "DGv6ra1nlYgDCS1FRnbzlw";
        pub const AUTH_SECRET: &str = "BTBZMqHH6r4Tts7J_aSIgg";
        pub const CEK: &str = "oIhVW04MRdy2XN9CiKLxTg";
        pub const NONCE: &str = "4h_95klXJ5E_qnoN";
        pub const BODY: &str = "DGv6ra1nlYgDCS1FRnbzlwAAEABBBP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLocInmYWAmS6TlzAC8wEqKK6PBru3jl7A_yl95bQpu6cVPTpK4Mqgkf1CXztLVBSt2Ks3oZwbuwXPXLWyouBWLVWGNWQexSgSxsj_Qulcy4a-fN";
    }

    #[test]
    fn test_matches_rfc8291_example() {
        use crate::transport::decode_base64url as b64;
        use rfc8291_example::*;

        let as_secret = SecretKey::from_slice(&b64(AS_PRIVATE).unwrap()).unwrap();
        let as_public = as_secret.public_key().to_encoded_point(false);
        assert_eq!(as_public.as_bytes(), b64(AS_PUBLIC).unwrap().as_slice());

        let ua_public_bytes = b64(UA_PUBLIC).unwrap();
        let ua_public = PublicKey::from_sec1_bytes(&ua_public_bytes).unwrap();
        let shared =
            p256::ecdh::diffie_hellman(as_secret.to_nonzero_scalar(), ua_public.as_affine());
        let auth_secret = b64(AUTH_SECRET).unwrap();
        let keying = Keying {
            ua_public: &ua_public_bytes,
            as_public: as_public.as_bytes(),
            auth_secret: &auth_secret,
            ecdh_secret: shared.raw_secret_bytes().as_slice(),
        };
        let salt: [u8; SALT_LEN] = b64(SALT).unwrap().try_into().unwrap();

        let keys = derive_record_keys(&keying, &salt).unwrap();
        assert_eq!(keys.cek.as_slice(), b64(CEK).unwrap().as_slice());
        assert_eq!(keys.nonce.as_slice(), b64(NONCE).unwrap().as_slice());

        let body = seal(PLAINTEXT, &keying, salt).unwrap();
        assert_eq!(encode_base64url(&body), BODY);

        let ua = UserAgent {
            secret: SecretKey::from_slice(&b64(UA_PRIVATE).unwrap()).unwrap(),
            p256dh: UA_PUBLIC.to_string(),
            auth: AUTH_SECRET.to_string(),
        };
        assert_eq!(ua.decrypt(&body), PLAINTEXT);
    }
}
