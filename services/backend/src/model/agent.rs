//! Pair codes and relay agent identities.
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Single-use pairing code bound to a tenant and an agent display name.
#[derive(Debug, Clone)]
pub struct PairCode {
    pub code: String,
    pub tenant_id: String,
    pub agent_name: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PairCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Permanent identity of a paired relay agent.
///
/// `public_key_pem` and `refresh_secret_hash` are fixed at creation. Re-pairing
/// produces a new identity.
#[derive(Debug, Clone)]
pub struct RelayAgent {
    pub id: Uuid,
    pub name: String,
    pub tenant_id: String,
    pub public_key_pem: String,
    pub refresh_secret_hash: String,
    pub is_active: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Agent-supplied half of a redemption. Tenant and name come from the code.
#[derive(Debug, Clone)]
pub struct AgentEnrollment {
    pub id: Uuid,
    pub public_key_pem: String,
    pub refresh_secret_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AgentEnrollment {
    pub fn bind(self, code: &PairCode) -> RelayAgent {
        RelayAgent {
            id: self.id,
            name: code.agent_name.clone(),
            tenant_id: code.tenant_id.clone(),
            public_key_pem: self.public_key_pem,
            refresh_secret_hash: self.refresh_secret_hash,
            is_active: true,
            last_seen_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}
