//! Signed bearer tokens for human users and relay agents.
//!
//! # Purpose
//! One codec type, generic over the claim shape, instantiated once per
//! signing domain. Each domain owns its secret, expiry policy, and `iss`/`aud`
//! pair, so a token minted in one domain never verifies in the other.
//!
//! # Key invariants
//! - Tokens are HS256 JWTs; any other algorithm is rejected.
//! - `iat`, `exp`, `iss`, and `aud` are always present and validated.
//! - Verification failures collapse to three kinds: `InvalidSignature`,
//!   `Expired`, `MalformedClaims`. Callers never see the raw JWT error.
//!
//! # Examples
//! ```rust
//! use vigil_backend::auth::token::{HumanClaims, TokenCodec};
//! use uuid::Uuid;
//!
//! let codec = TokenCodec::<HumanClaims>::new(b"human-secret", 900, 30);
//! let claims = HumanClaims {
//!     sub: Uuid::new_v4(),
//!     email: "ops@example.com".to_string(),
//!     role: "admin".to_string(),
//!     tid: "tenant-a".to_string(),
//! };
//! let token = codec.sign(&claims).expect("sign");
//! assert_eq!(codec.verify(&token).expect("verify"), claims);
//! ```
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token claims are malformed")]
    MalformedClaims,
    #[error("token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::Base64(_)
            | ErrorKind::Utf8(_) => TokenError::InvalidSignature,
            ErrorKind::Json(_)
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature => TokenError::MalformedClaims,
            _ => TokenError::InvalidSignature,
        }
    }
}

/// Claim shape of one signing domain.
pub trait DomainClaims: Serialize + DeserializeOwned + Clone + Send + Sync {
    const ISSUER: &'static str;
    const AUDIENCE: &'static str;

    /// Domain-specific checks beyond what deserialization enforces.
    fn check(&self) -> Result<(), TokenError> {
        Ok(())
    }
}

/// Human access token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub tid: String,
}

impl DomainClaims for HumanClaims {
    const ISSUER: &'static str = "vigil/users";
    const AUDIENCE: &'static str = "vigil-api";

    fn check(&self) -> Result<(), TokenError> {
        if self.tid.trim().is_empty() || self.email.is_empty() || self.role.is_empty() {
            return Err(TokenError::MalformedClaims);
        }
        Ok(())
    }
}

/// Marker carried by every agent token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "agent")]
    Agent,
}

/// Relay agent token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentClaims {
    pub sub: Uuid,
    pub tid: String,
    pub kind: AgentKind,
}

impl AgentClaims {
    pub fn new(agent_id: Uuid, tenant_id: impl Into<String>) -> Self {
        Self {
            sub: agent_id,
            tid: tenant_id.into(),
            kind: AgentKind::Agent,
        }
    }
}

impl DomainClaims for AgentClaims {
    const ISSUER: &'static str = "vigil/agents";
    const AUDIENCE: &'static str = "vigil-relay";

    fn check(&self) -> Result<(), TokenError> {
        if self.tid.trim().is_empty() {
            return Err(TokenError::MalformedClaims);
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct SignedClaims<T> {
    #[serde(flatten)]
    claims: T,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// HS256 codec for one signing domain.
pub struct TokenCodec<C> {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: u64,
    leeway_seconds: u64,
    _claims: PhantomData<fn() -> C>,
}

impl<C> Clone for TokenCodec<C> {
    fn clone(&self) -> Self {
        Self {
            encoding: self.encoding.clone(),
            decoding: self.decoding.clone(),
            ttl_seconds: self.ttl_seconds,
            leeway_seconds: self.leeway_seconds,
            _claims: PhantomData,
        }
    }
}

pub type HumanTokenCodec = TokenCodec<HumanClaims>;
pub type AgentTokenCodec = TokenCodec<AgentClaims>;

impl<C: DomainClaims> TokenCodec<C> {
    pub fn new(secret: &[u8], ttl_seconds: u64, leeway_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_seconds,
            leeway_seconds,
            _claims: PhantomData,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn sign(&self, claims: &C) -> Result<String, TokenError> {
        self.sign_at(claims, now_epoch_seconds())
    }

    /// Sign with an explicit issue time (epoch seconds).
    pub fn sign_at(&self, claims: &C, issued_at: i64) -> Result<String, TokenError> {
        let signed = SignedClaims {
            claims,
            iss: C::ISSUER.to_string(),
            aud: C::AUDIENCE.to_string(),
            iat: issued_at,
            exp: issued_at + self.ttl_seconds as i64,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &signed, &self.encoding)
            .map_err(TokenError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[C::ISSUER]);
        validation.set_audience(&[C::AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud"]);
        validation.leeway = self.leeway_seconds;
        let data = jsonwebtoken::decode::<SignedClaims<C>>(token, &self.decoding, &validation)?;
        data.claims.claims.check()?;
        Ok(data.claims.claims)
    }
}

pub(crate) fn now_epoch_seconds() -> i64 {
    // Clamp a clock that reads before the epoch instead of panicking.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}
