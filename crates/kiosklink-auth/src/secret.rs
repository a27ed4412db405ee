//! Identifier, secret and pairing code generation
//!
//! Bearer secrets and session tokens are high-entropy random strings, so a
//! single SHA-256 pass is enough to make the stored form one-way. Checks
//! against stored digests are constant-time.

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
    Engine as _,
};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix of every server-issued device identifier
pub const DEVICE_ID_PREFIX: &str = "dev-";

const DEVICE_ID_RANDOM_LEN: usize = 10;

/// Generate a candidate device identifier (`dev-` + 10 lowercase alphanumerics)
///
/// Callers must still check the candidate against existing devices.
pub fn generate_device_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DEVICE_ID_RANDOM_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("{}{}", DEVICE_ID_PREFIX, suffix)
}

/// Generate a secure random bearer token (device secret or session token)
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a six-digit, human-transcribable pairing code
pub fn generate_pairing_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    code.to_string()
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Check a presented token against its stored hash
pub fn verify_token(token: &str, stored_hash: &str) -> bool {
    constant_time_eq(hash_token(token).as_bytes(), stored_hash.as_bytes())
}

/// Compare two byte strings without short-circuiting on the first mismatch
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_shape() {
        let id = generate_device_id();
        assert!(id.starts_with(DEVICE_ID_PREFIX));
        let suffix = &id[DEVICE_ID_PREFIX.len()..];
        assert_eq!(suffix.len(), 10);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_pairing_code_is_six_digits() {
        for _ in 0..200 {
            let code = generate_pairing_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_token_hashing() {
        let token = "test_token_123";
        let hash1 = hash_token(token);
        let hash2 = hash_token(token);
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, token);

        let different_hash = hash_token("different_token");
        assert_ne!(hash1, different_hash);
    }

    #[test]
    fn test_verify_token() {
        let token = generate_token();
        let stored = hash_token(&token);
        assert!(verify_token(&token, &stored));
        assert!(!verify_token("not-it", &stored));
        assert!(!verify_token("", &stored));
    }
}
