//! Human principals and their refresh credentials.
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    /// Stored as given; uniqueness is exact-match.
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
}

/// Server-side record of a human refresh secret.
///
/// Only `revoked_at` ever changes after insert. Revoked rows are kept.
#[derive(Debug, Clone)]
pub struct RefreshCredential {
    pub id: Uuid,
    pub secret_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub issued_ip: Option<String>,
    pub issued_user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RefreshCredential {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshCredential {
    pub secret_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub issued_ip: Option<String>,
    pub issued_user_agent: Option<String>,
}

impl NewRefreshCredential {
    pub fn into_credential(self, now: DateTime<Utc>) -> RefreshCredential {
        RefreshCredential {
            id: Uuid::new_v4(),
            secret_hash: self.secret_hash,
            user_id: self.user_id,
            expires_at: self.expires_at,
            revoked_at: None,
            issued_ip: self.issued_ip,
            issued_user_agent: self.issued_user_agent,
            created_at: now,
        }
    }
}
