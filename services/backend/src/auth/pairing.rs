//! Pairing protocol: short-lived codes exchanged for permanent agent identities.
//!
//! # Purpose
//! A tenant actor issues a pair code naming the agent it expects. An unpaired
//! agent redeems that code together with its freshly generated RSA public key
//! and receives an agent id plus a refresh secret shown exactly once.
//!
//! # Key invariants
//! - A code is consumed at most once; the store makes find/delete/create one
//!   atomic step, so racing redemptions produce exactly one agent.
//! - A code at or past `expires_at` is never redeemable.
//! - The public key is validated before the code is consumed.
//! - Only the SHA-256 digest of the refresh secret is persisted.
use crate::model::{AgentEnrollment, PairCode, RelayAgent};
use crate::store::{StoreError, TrustStore};
use chrono::{Duration, Utc};
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;
use vigil_crypto::{RecipientKey, random_secret_urlsafe, sha256_hex};

const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CODE_GROUP_LEN: usize = 4;
const ISSUE_ATTEMPTS: usize = 5;
pub const AGENT_REFRESH_SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("pair code not found")]
    NotFound,
    #[error("pair code expired")]
    Expired,
    #[error("public key is not a usable RSA public key")]
    InvalidRecipientKey,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a successful redemption. `refresh_secret` is the only plaintext copy.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub agent: RelayAgent,
    pub refresh_secret: String,
}

/// Two groups of four characters from `[0-9A-Z]`, e.g. `AB3K-9XQ2`.
pub fn generate_pair_code() -> String {
    let mut rng = rand::thread_rng();
    let mut group = || -> String {
        (0..CODE_GROUP_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    };
    let first = group();
    let second = group();
    format!("{first}-{second}")
}

pub async fn issue_pair_code(
    store: &(dyn TrustStore + Send + Sync),
    tenant_id: &str,
    agent_name: &str,
    ttl: Duration,
) -> Result<PairCode, PairingError> {
    let agent_name = agent_name.trim();
    if agent_name.is_empty() {
        return Err(PairingError::Validation("agentName is required"));
    }
    let mut last_err = None;
    for _ in 0..ISSUE_ATTEMPTS {
        let now = Utc::now();
        let candidate = PairCode {
            code: generate_pair_code(),
            tenant_id: tenant_id.to_string(),
            agent_name: agent_name.to_string(),
            expires_at: now + ttl,
            created_at: now,
        };
        match store.insert_pair_code(candidate).await {
            Ok(code) => {
                metrics::counter!("vigil_pair_codes_issued_total").increment(1);
                tracing::info!(tenant_id = %code.tenant_id, expires_at = %code.expires_at, "pair code issued");
                return Ok(code);
            }
            Err(err @ StoreError::Conflict(_)) => {
                tracing::debug!("pair code collision, retrying");
                last_err = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(last_err
        .map(PairingError::Store)
        .unwrap_or(PairingError::Validation("could not allocate pair code")))
}

pub async fn redeem_pair_code(
    store: &(dyn TrustStore + Send + Sync),
    code: &str,
    public_key_pem: &str,
) -> Result<Redemption, PairingError> {
    let code = code.trim();
    let public_key_pem = public_key_pem.trim();
    if code.is_empty() || public_key_pem.is_empty() {
        return Err(PairingError::Validation("code and publicKeyPem are required"));
    }
    RecipientKey::from_pem(public_key_pem).map_err(|_| PairingError::InvalidRecipientKey)?;

    let refresh_secret = random_secret_urlsafe(AGENT_REFRESH_SECRET_BYTES);
    let now = Utc::now();
    let enrollment = AgentEnrollment {
        id: Uuid::new_v4(),
        public_key_pem: public_key_pem.to_string(),
        refresh_secret_hash: sha256_hex(&refresh_secret),
        created_at: now,
    };
    let result = store.redeem_pair_code(code, now, enrollment).await;
    let outcome = match &result {
        Ok(_) => "redeemed",
        Err(StoreError::NotFound(_)) => "not_found",
        Err(StoreError::Expired(_)) => "expired",
        Err(_) => "error",
    };
    metrics::counter!("vigil_pair_codes_redeemed_total", "outcome" => outcome).increment(1);
    match result {
        Ok(agent) => {
            tracing::info!(agent_id = %agent.id, tenant_id = %agent.tenant_id, "relay agent paired");
            Ok(Redemption {
                agent,
                refresh_secret,
            })
        }
        Err(StoreError::NotFound(_)) => Err(PairingError::NotFound),
        Err(StoreError::Expired(_)) => Err(PairingError::Expired),
        Err(err) => Err(err.into()),
    }
}
