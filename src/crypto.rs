//! # Cryptographic Operations
//!
//! Key material for one sync session:
//! - Password credentials, Unicode NFC-normalized once at construction
//! - PBKDF2-HMAC-SHA-256 session key derivation from a password and a salt
//! - Authenticated tokens in the Fernet format (AES-128-CBC + HMAC-SHA-256,
//!   random IV, embedded timestamp)
//!
//! The derived key is kept in its URL-safe base64 form because that is the
//! form the handshake fingerprint is computed over; peers running other
//! implementations of the protocol hash the same text.

use base64::prelude::*;
use fernet::Fernet;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, SyncError};

/// PBKDF2 rounds used by every peer speaking the default protocol.
pub const KDF_ITERATIONS: u32 = 1_200_000;

pub const KEY_LEN: usize = 32;

pub const SALT_LEN: usize = 16;

/// The shared secret for a session.
///
/// The password is normalized to NFC on construction so visually identical
/// input typed on different platforms derives the same key. The iteration
/// count travels with the credential; both peers must agree on it.
#[derive(Clone)]
pub struct Credential {
    password: Vec<u8>,
    iterations: u32,
}

impl Credential {
    pub fn new(password: &str) -> Self {
        Self::with_iterations(password, KDF_ITERATIONS)
    }

    /// Credential with a non-default KDF cost. Only interoperable with peers
    /// configured with the same count.
    pub fn with_iterations(password: &str, iterations: u32) -> Self {
        let normalized: String = password.nfc().collect();
        Self {
            password: normalized.into_bytes(),
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("password", &"<redacted>")
            .field("iterations", &self.iterations)
            .finish()
    }
}

/// Symmetric key for one connection. Never serialized, never sent.
pub struct SessionKey {
    encoded: String,
    fernet: Fernet,
}

impl SessionKey {
    fn from_bytes(raw: [u8; KEY_LEN]) -> Self {
        let encoded = BASE64_URL_SAFE.encode(raw);
        Self::from_encoded(encoded).expect("a 32-byte key is always a valid Fernet key")
    }

    fn from_encoded(encoded: String) -> Option<Self> {
        let fernet = Fernet::new(&encoded)?;
        Some(Self { encoded, fernet })
    }

    /// Lowercase hex SHA-256 of the encoded key, sent as the handshake proof.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.encoded.as_bytes()))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.fernet.encrypt(plaintext).into_bytes()
    }

    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>> {
        let token = std::str::from_utf8(token).map_err(|_| SyncError::Authentication)?;
        // No TTL applies, so the token is checked against its own timestamp
        // and clock skew between peers never rejects a frame.
        let issued_at = token_timestamp(token).ok_or(SyncError::Authentication)?;
        self.fernet
            .decrypt_at_time(token, None, issued_at)
            .map_err(|_| SyncError::Authentication)
    }
}

/// Seconds since the epoch embedded at bytes 1..9 of a Fernet token.
fn token_timestamp(token: &str) -> Option<u64> {
    let raw = BASE64_URL_SAFE.decode(token).ok()?;
    let stamp: [u8; 8] = raw.get(1..9)?.try_into().ok()?;
    Some(u64::from_be_bytes(stamp))
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

pub fn derive_key(credential: &Credential, salt: &[u8]) -> SessionKey {
    let mut raw = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(&credential.password, salt, credential.iterations, &mut raw);
    SessionKey::from_bytes(raw)
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn fast(password: &str) -> Credential {
        Credential::with_iterations(password, 16)
    }

    fn raw_key(key: &SessionKey) -> Vec<u8> {
        BASE64_URL_SAFE.decode(&key.encoded).unwrap()
    }

    #[test]
    fn test_derive_key_default_cost_is_deterministic() {
        let credential = Credential::new("correct horse battery staple");
        let salt = [7u8; SALT_LEN];

        let first = derive_key(&credential, &salt);
        let second = derive_key(&credential, &salt);

        assert_eq!(credential.iterations(), KDF_ITERATIONS);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_derive_key_known_vector() {
        // PBKDF2-HMAC-SHA256("passwd", "salt", 1), RFC 7914 section 11.
        let key = derive_key(&Credential::with_iterations("passwd", 1), b"salt");
        assert_eq!(
            hex::encode(raw_key(&key)),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn test_different_passwords_derive_different_keys() {
        let salt = generate_salt();
        let a = derive_key(&fast("alpha"), &salt);
        let b = derive_key(&fast("bravo"), &salt);
        assert_ne!(raw_key(&a), raw_key(&b));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_different_salts_derive_different_keys() {
        let credential = fast("alpha");
        let a = derive_key(&credential, &[1u8; SALT_LEN]);
        let b = derive_key(&credential, &[2u8; SALT_LEN]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_password_is_nfc_normalized() {
        let composed = fast("caf\u{e9}");
        let decomposed = fast("cafe\u{301}");
        let salt = [3u8; SALT_LEN];
        assert_eq!(
            derive_key(&composed, &salt).fingerprint(),
            derive_key(&decomposed, &salt).fingerprint()
        );
    }

    #[test]
    fn test_fingerprint_is_sha256_hex_of_encoded_key() {
        let key = derive_key(&fast("pw"), &[0u8; SALT_LEN]);
        let fingerprint = key.fingerprint();
        assert_eq!(fingerprint.len(), 64);
        assert_eq!(fingerprint, hex::encode(Sha256::digest(key.encoded.as_bytes())));
    }

    #[test]
    fn test_decrypts_reference_fernet_token() {
        let encoded = "cw_0x689RpI-jtRR7oE8h_eQsKImvJapLeSbXpwF4e4=".to_string();
        let key = SessionKey::from_encoded(encoded).unwrap();
        let token = concat!(
            "gAAAAAAdwJ6wAAECAwQFBgcICQoLDA0ODy021cpGVWKZ_eEwCGM4BLLF_5CV9dOPmrhuVU",
            "PgJobwOz7JcbmrR64jVmpU4IwqDA=="
        );
        assert_eq!(key.decrypt(token.as_bytes()).unwrap(), b"hello");
    }

    #[test]
    fn test_token_from_a_clock_far_ahead_decrypts() {
        let key = derive_key(&fast("pw"), &generate_salt());
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let ahead = key.fernet.encrypt_at_time(b"from the future", now + 3600);
        assert_eq!(key.decrypt(ahead.as_bytes()).unwrap(), b"from the future");

        let behind = key.fernet.encrypt_at_time(b"from the past", now - 30 * 86_400);
        assert_eq!(key.decrypt(behind.as_bytes()).unwrap(), b"from the past");
    }

    #[test]
    fn test_token_timestamp_is_read_from_header() {
        let key = derive_key(&fast("pw"), &generate_salt());
        let token = key.fernet.encrypt_at_time(b"x", 499_162_800);
        assert_eq!(token_timestamp(&token), Some(499_162_800));
        assert_eq!(token_timestamp("gA=="), None);
    }

    #[test]
    fn test_empty_plaintext_round_trips() {
        let key = derive_key(&fast("pw"), &generate_salt());
        let token = key.encrypt(b"");
        assert_eq!(key.decrypt(&token).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_tokens_use_fresh_iv() {
        let key = derive_key(&fast("pw"), &generate_salt());
        assert_ne!(key.encrypt(b"same"), key.encrypt(b"same"));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let salt = generate_salt();
        let sender = derive_key(&fast("right"), &salt);
        let receiver = derive_key(&fast("wrong"), &salt);
        let token = sender.encrypt(b"secret");
        assert_matches!(receiver.decrypt(&token), Err(SyncError::Authentication));
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let key = derive_key(&fast("pw"), &generate_salt());
        let token = key.encrypt(b"bits");
        let raw = BASE64_URL_SAFE.decode(&token).unwrap();

        for bit in 0..raw.len() * 8 {
            let mut tampered = raw.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            let tampered = BASE64_URL_SAFE.encode(&tampered);
            assert_matches!(
                key.decrypt(tampered.as_bytes()),
                Err(SyncError::Authentication),
                "bit {} went undetected",
                bit
            );
        }
    }

    #[test]
    fn test_garbage_token_fails_authentication() {
        let key = derive_key(&fast("pw"), &generate_salt());
        assert_matches!(key.decrypt(&[0xff, 0xfe, 0x00]), Err(SyncError::Authentication));
        assert_matches!(key.decrypt(b"not a token"), Err(SyncError::Authentication));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let credential = fast("hunter2");
        let key = derive_key(&credential, &[0u8; SALT_LEN]);
        assert!(!format!("{:?}", credential).contains("hunter2"));
        assert!(!format!("{:?}", key).contains(&key.encoded));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_decrypt_inverts_encrypt(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let key = derive_key(&fast("prop"), &[9u8; SALT_LEN]);
            let token = key.encrypt(&data);
            prop_assert_eq!(key.decrypt(&token).unwrap(), data);
        }
    }
}
