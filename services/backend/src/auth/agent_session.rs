//! Agent session issuer and liveness.
//!
//! Exchanges an agent's long-lived refresh secret for a short-lived agent
//! token. Secrets are compared by digest in constant time and are not rotated.
use crate::auth::context::AgentContext;
use crate::auth::token::{AgentClaims, AgentTokenCodec, TokenError};
use crate::model::RelayAgent;
use crate::store::{StoreError, TrustStore};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;
use vigil_crypto::secret_matches;

#[derive(Debug, Error)]
pub enum AgentSessionError {
    #[error("agent not found")]
    NotFound,
    #[error("invalid agent credential")]
    InvalidCredential,
    #[error("agent is not permitted")]
    Forbidden,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AgentSessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AgentSessionError::NotFound,
            other => AgentSessionError::Store(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedAgentToken {
    pub access_token: String,
    pub expires_in: u64,
    pub agent_id: Uuid,
    pub tenant_id: String,
}

pub async fn exchange_agent_secret(
    store: &(dyn TrustStore + Send + Sync),
    codec: &AgentTokenCodec,
    agent_id: Uuid,
    refresh_secret: &str,
) -> Result<IssuedAgentToken, AgentSessionError> {
    let agent = store.get_agent(agent_id).await?;
    if !secret_matches(refresh_secret, &agent.refresh_secret_hash) {
        tracing::warn!(agent_id = %agent_id, "agent presented an invalid refresh secret");
        return Err(AgentSessionError::InvalidCredential);
    }
    if !agent.is_active {
        return Err(AgentSessionError::Forbidden);
    }
    let access_token = codec.sign(&AgentClaims::new(agent.id, agent.tenant_id.clone()))?;
    metrics::counter!("vigil_agent_tokens_issued_total").increment(1);
    Ok(IssuedAgentToken {
        access_token,
        expires_in: codec.ttl_seconds(),
        agent_id: agent.id,
        tenant_id: agent.tenant_id,
    })
}

/// Load the token's agent for a route addressed to `path_agent_id`.
///
/// Fails with `Forbidden` for a deactivated agent even while its token is
/// still valid.
pub async fn require_active(
    store: &(dyn TrustStore + Send + Sync),
    context: &AgentContext,
    path_agent_id: &str,
) -> Result<RelayAgent, AgentSessionError> {
    context
        .ensure_addresses(path_agent_id)
        .map_err(|_| AgentSessionError::Forbidden)?;
    let agent = store.get_agent(context.agent_id).await?;
    if agent.tenant_id != context.tenant_id || !agent.is_active {
        tracing::warn!(agent_id = %agent.id, "inactive relay agent presented a live token");
        return Err(AgentSessionError::Forbidden);
    }
    Ok(agent)
}

/// Advance `last_seen_at` for the token's agent. Returns the recorded time.
pub async fn record_heartbeat(
    store: &(dyn TrustStore + Send + Sync),
    context: &AgentContext,
    path_agent_id: &str,
) -> Result<DateTime<Utc>, AgentSessionError> {
    require_active(store, context, path_agent_id).await?;
    let now = Utc::now();
    store.touch_agent(context.agent_id, now).await?;
    Ok(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::AgentKind;
    use crate::model::{AgentEnrollment, PairCode};
    use crate::store::memory::InMemoryStore;
    use chrono::Duration;
    use vigil_crypto::sha256_hex;

    async fn paired_agent(store: &InMemoryStore, secret: &str) -> Uuid {
        let now = Utc::now();
        store
            .insert_pair_code(PairCode {
                code: "AAAA-1111".to_string(),
                tenant_id: "T1".to_string(),
                agent_name: "Gate-01".to_string(),
                expires_at: now + Duration::minutes(10),
                created_at: now,
            })
            .await
            .expect("code");
        store
            .redeem_pair_code(
                "AAAA-1111",
                now,
                AgentEnrollment {
                    id: Uuid::new_v4(),
                    public_key_pem: "pem".to_string(),
                    refresh_secret_hash: sha256_hex(secret),
                    created_at: now,
                },
            )
            .await
            .expect("redeem")
            .id
    }

    fn codec() -> AgentTokenCodec {
        AgentTokenCodec::new(b"agent-secret", 43_200, 0)
    }

    #[tokio::test]
    async fn right_secret_mints_agent_token() {
        let store = InMemoryStore::new();
        let agent_id = paired_agent(&store, "s3cret").await;
        let issued = exchange_agent_secret(&store, &codec(), agent_id, "s3cret")
            .await
            .expect("exchange");
        assert_eq!(issued.expires_in, 43_200);
        let claims = codec().verify(&issued.access_token).expect("verify");
        assert_eq!(claims.sub, agent_id);
        assert_eq!(claims.tid, "T1");
        assert_eq!(claims.kind, AgentKind::Agent);
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid_credential() {
        let store = InMemoryStore::new();
        let agent_id = paired_agent(&store, "s3cret").await;
        let err = exchange_agent_secret(&store, &codec(), agent_id, "guess")
            .await
            .expect_err("wrong");
        assert!(matches!(err, AgentSessionError::InvalidCredential));
    }

    #[tokio::test]
    async fn unknown_agent_is_not_found() {
        let store = InMemoryStore::new();
        let err = exchange_agent_secret(&store, &codec(), Uuid::new_v4(), "s3cret")
            .await
            .expect_err("unknown");
        assert!(matches!(err, AgentSessionError::NotFound));
    }

    #[tokio::test]
    async fn inactive_agent_is_forbidden() {
        let store = InMemoryStore::new();
        let agent_id = paired_agent(&store, "s3cret").await;
        store
            .set_agent_active(agent_id, false, Utc::now())
            .await
            .expect("deactivate");
        let err = exchange_agent_secret(&store, &codec(), agent_id, "s3cret")
            .await
            .expect_err("inactive");
        assert!(matches!(err, AgentSessionError::Forbidden));
    }

    #[tokio::test]
    async fn heartbeat_requires_matching_agent() {
        let store = InMemoryStore::new();
        let agent_id = paired_agent(&store, "s3cret").await;
        let context = AgentContext {
            tenant_id: "T1".to_string(),
            agent_id,
        };
        let err = record_heartbeat(&store, &context, &Uuid::new_v4().to_string())
            .await
            .expect_err("other agent");
        assert!(matches!(err, AgentSessionError::Forbidden));
        assert!(store.get_agent(agent_id).await.expect("agent").last_seen_at.is_none());

        let seen = record_heartbeat(&store, &context, &agent_id.to_string())
            .await
            .expect("heartbeat");
        assert_eq!(
            store.get_agent(agent_id).await.expect("agent").last_seen_at,
            Some(seen)
        );
    }

    #[tokio::test]
    async fn deactivated_agent_loses_live_token_access() {
        let store = InMemoryStore::new();
        let agent_id = paired_agent(&store, "s3cret").await;
        let context = AgentContext {
            tenant_id: "T1".to_string(),
            agent_id,
        };
        require_active(&store, &context, &agent_id.to_string())
            .await
            .expect("active agent");

        store
            .set_agent_active(agent_id, false, Utc::now())
            .await
            .expect("deactivate");
        let err = require_active(&store, &context, &agent_id.to_string())
            .await
            .expect_err("deactivated");
        assert!(matches!(err, AgentSessionError::Forbidden));
        let err = record_heartbeat(&store, &context, &agent_id.to_string())
            .await
            .expect_err("heartbeat after deactivation");
        assert!(matches!(err, AgentSessionError::Forbidden));
        assert!(store.get_agent(agent_id).await.expect("agent").last_seen_at.is_none());
    }

    #[tokio::test]
    async fn token_tenant_must_match_agent() {
        let store = InMemoryStore::new();
        let agent_id = paired_agent(&store, "s3cret").await;
        let context = AgentContext {
            tenant_id: "T2".to_string(),
            agent_id,
        };
        let err = require_active(&store, &context, &agent_id.to_string())
            .await
            .expect_err("tenant mismatch");
        assert!(matches!(err, AgentSessionError::Forbidden));
    }
}
