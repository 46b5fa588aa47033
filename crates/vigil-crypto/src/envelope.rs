//! Hybrid envelope sealing for relay agents.
//!
//! # Purpose
//! Encrypts a serializable payload under a fresh AES-256-GCM key and wraps that
//! key for the recipient with RSA-OAEP(SHA-256).
//!
//! # Key invariants
//! - Every call draws a new symmetric key and nonce from the OS-seeded RNG.
//! - The symmetric key and serialized plaintext are zeroized on drop.
//! - Either a complete bundle is returned or an error; never partial output.
//!
//! # Security boundary
//! The issuing side only ever sees the recipient's public key. There is no
//! `open` counterpart in this crate.
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

const SYMMETRIC_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_RSA_BITS: usize = 2048;
const PKCS1_PUBLIC_LABEL: &str = "-----BEGIN RSA PUBLIC KEY-----";

/// Self-contained sealed payload.
///
/// All four fields are standard base64. The JSON shape (`encKey`, `iv`, `tag`,
/// `ciphertext`) is what relay agents parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeBundle {
    pub enc_key: String,
    pub iv: String,
    pub tag: String,
    pub ciphertext: String,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("recipient public key is not a usable RSA public key")]
    InvalidRecipientKey,
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("symmetric encryption failed")]
    Cipher,
    #[error("key wrapping failed: {0}")]
    Wrap(#[from] rsa::Error),
}

/// Parsed recipient public key.
#[derive(Debug, Clone)]
pub struct RecipientKey(RsaPublicKey);

impl RecipientKey {
    /// Parse an RSA public key from PEM.
    ///
    /// Accepts SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`) and PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`) encodings. Keys shorter than 2048 bits are
    /// rejected.
    ///
    /// # Errors
    /// - `EnvelopeError::InvalidRecipientKey` when the PEM cannot be parsed or
    ///   the modulus is too small.
    pub fn from_pem(pem: &str) -> Result<Self, EnvelopeError> {
        let pem = pem.trim();
        let key = if pem.starts_with(PKCS1_PUBLIC_LABEL) {
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|_| EnvelopeError::InvalidRecipientKey)?
        } else {
            RsaPublicKey::from_public_key_pem(pem)
                .map_err(|_| EnvelopeError::InvalidRecipientKey)?
        };
        if key.size() * 8 < MIN_RSA_BITS {
            return Err(EnvelopeError::InvalidRecipientKey);
        }
        Ok(Self(key))
    }

    pub fn bits(&self) -> usize {
        self.0.size() * 8
    }
}

/// Seal `payload` for `recipient`.
///
/// The payload is serialized to JSON, encrypted with AES-256-GCM under a fresh
/// key and nonce, and the key is wrapped with RSA-OAEP(SHA-256).
///
/// # Errors
/// - `EnvelopeError::Serialize` if the payload cannot be encoded.
/// - `EnvelopeError::Cipher` / `EnvelopeError::Wrap` on primitive failure.
pub fn seal_for<T: Serialize>(
    recipient: &RecipientKey,
    payload: &T,
) -> Result<EnvelopeBundle, EnvelopeError> {
    let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);
    let mut rng = rand::thread_rng();

    let mut key_bytes = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    rng.fill_bytes(key_bytes.as_mut());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes.as_ref()));
    // aes-gcm appends the tag; the wire format carries it separately.
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .map_err(|_| EnvelopeError::Cipher)?;
    let tag_start = sealed
        .len()
        .checked_sub(TAG_LEN)
        .ok_or(EnvelopeError::Cipher)?;
    let tag = sealed.split_off(tag_start);

    let wrapped_key = recipient
        .0
        .encrypt(&mut rng, Oaep::new::<Sha256>(), key_bytes.as_ref())?;

    Ok(EnvelopeBundle {
        enc_key: STANDARD.encode(wrapped_key),
        iv: STANDARD.encode(nonce_bytes),
        tag: STANDARD.encode(tag),
        ciphertext: STANDARD.encode(sealed),
    })
}
