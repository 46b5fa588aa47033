//! Cryptographic helpers shared by the Vigil backend.
//!
//! # Purpose
//! Seals small credential payloads for a relay agent's RSA public key and
//! generates/hashes the opaque secrets handed to users and agents.
//!
//! # Notes
//! Nothing in this crate can open a sealed envelope. Only the agent holding the
//! matching private key can recover the payload.
//!
//! ```
//! use vigil_crypto::{random_secret_hex, secret_matches, sha256_hex};
//!
//! let secret = random_secret_hex(16);
//! let stored = sha256_hex(&secret);
//! assert!(secret_matches(&secret, &stored));
//! ```
pub mod envelope;
pub mod secret;

pub use envelope::{EnvelopeBundle, EnvelopeError, RecipientKey, seal_for};
pub use secret::{random_secret_hex, random_secret_urlsafe, secret_matches, sha256_hex};
