//! Opaque secret generation and at-rest hashing.
//!
//! Refresh tokens and agent secrets are random strings handed out once; only
//! their SHA-256 hex digest is persisted.
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Random secret of `bytes` bytes, lowercase hex encoded.
pub fn random_secret_hex(bytes: usize) -> String {
    hex::encode(random_bytes(bytes))
}

/// Random secret of `bytes` bytes, unpadded base64url encoded.
pub fn random_secret_urlsafe(bytes: usize) -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(bytes))
}

pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Compare a presented secret against a stored digest in constant time.
pub fn secret_matches(candidate: &str, stored_hash: &str) -> bool {
    let computed = sha256_hex(candidate);
    // Digest lengths are fixed, so a length mismatch only leaks a malformed row.
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_secret_has_two_chars_per_byte() {
        let secret = random_secret_hex(48);
        assert_eq!(secret.len(), 96);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, random_secret_hex(48));
    }

    #[test]
    fn urlsafe_secret_avoids_reserved_characters() {
        let secret = random_secret_urlsafe(32);
        assert_eq!(secret.len(), 43);
        assert!(!secret.contains(['+', '/', '=']));
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn secret_matches_only_its_own_digest() {
        let secret = random_secret_urlsafe(32);
        let stored = sha256_hex(&secret);
        assert!(secret_matches(&secret, &stored));
        assert!(!secret_matches("something-else", &stored));
        assert!(!secret_matches(&secret, "short"));
    }
}
