//! Request identity extractors.
//!
//! # Purpose
//! Resolves the tenant (and, on agent routes, the agent) a request acts for
//! before any handler runs. Handlers receive typed `TenantContext` /
//! `AgentContext` values instead of reading headers themselves.
//!
//! # Resolution rules
//! - `TenantContext`: a bearer token verified in the human domain wins. If an
//!   `Authorization` header is present it must verify; there is no fallback to
//!   `x-tenant-id` after a bad token. Without `Authorization`, a non-empty
//!   `x-tenant-id` header scopes the request. Neither yields `TenantRequired`.
//! - `AgentContext`: a bearer token verified in the agent domain is required.
//!   Routes that address an agent id must call `ensure_addresses`.
use crate::api::error::ApiError;
use crate::app::AppState;
use crate::auth::token::{AgentTokenCodec, HumanClaims, HumanTokenCodec, TokenError};
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use thiserror::Error;
use uuid::Uuid;

pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("tenant scope is required")]
    TenantRequired,
    #[error("missing bearer token")]
    MissingBearer,
    #[error("bearer token rejected: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("token does not address this agent")]
    Forbidden,
}

/// Tenant scope of a request, with the human principal when one signed in.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user: Option<HumanClaims>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentContext {
    pub tenant_id: String,
    pub agent_id: Uuid,
}

impl AgentContext {
    /// Require that the path-addressed agent is the token's agent.
    pub fn ensure_addresses(&self, path_agent_id: &str) -> Result<(), ContextError> {
        match Uuid::parse_str(path_agent_id.trim()) {
            Ok(id) if id == self.agent_id => Ok(()),
            _ => Err(ContextError::Forbidden),
        }
    }
}

/// `Ok(None)` when no `Authorization` header is present.
pub fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, ContextError> {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ContextError::MissingBearer)?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim())),
        _ => Err(ContextError::MissingBearer),
    }
}

pub fn resolve_tenant(
    headers: &HeaderMap,
    codec: &HumanTokenCodec,
) -> Result<TenantContext, ContextError> {
    if let Some(token) = extract_bearer(headers)? {
        let claims = codec.verify(token)?;
        return Ok(TenantContext {
            tenant_id: claims.tid.clone(),
            user: Some(claims),
        });
    }
    let tenant_id = headers
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ContextError::TenantRequired)?;
    Ok(TenantContext {
        tenant_id: tenant_id.to_string(),
        user: None,
    })
}

pub fn resolve_agent(
    headers: &HeaderMap,
    codec: &AgentTokenCodec,
) -> Result<AgentContext, ContextError> {
    let token = extract_bearer(headers)?.ok_or(ContextError::MissingBearer)?;
    let claims = codec.verify(token)?;
    Ok(AgentContext {
        tenant_id: claims.tid,
        agent_id: claims.sub,
    })
}

#[axum::async_trait]
impl FromRequestParts<AppState> for TenantContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let context = resolve_tenant(&parts.headers, &state.human_tokens)?;
        tracing::Span::current().record("tenant_id", context.tenant_id.as_str());
        Ok(context)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AgentContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let context = resolve_agent(&parts.headers, &state.agent_tokens)?;
        tracing::Span::current().record("tenant_id", context.tenant_id.as_str());
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::AgentClaims;
    use axum::http::HeaderValue;

    fn human_codec() -> HumanTokenCodec {
        HumanTokenCodec::new(b"human", 900, 0)
    }

    fn agent_codec() -> AgentTokenCodec {
        AgentTokenCodec::new(b"agent", 900, 0)
    }

    fn human_token(tenant: &str) -> String {
        human_codec()
            .sign(&HumanClaims {
                sub: Uuid::new_v4(),
                email: "a@example.com".to_string(),
                role: "admin".to_string(),
                tid: tenant.to_string(),
            })
            .expect("sign")
    }

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (key, value) in pairs {
            map.insert(*key, HeaderValue::from_str(value).expect("header"));
        }
        map
    }

    #[test]
    fn bearer_token_scopes_tenant() {
        let map = headers(&[("authorization", format!("Bearer {}", human_token("T1")))]);
        let context = resolve_tenant(&map, &human_codec()).expect("tenant");
        assert_eq!(context.tenant_id, "T1");
        assert!(context.user.is_some());
    }

    #[test]
    fn bearer_wins_over_header() {
        let map = headers(&[
            ("authorization", format!("Bearer {}", human_token("T1"))),
            (TENANT_HEADER, "T2".to_string()),
        ]);
        let context = resolve_tenant(&map, &human_codec()).expect("tenant");
        assert_eq!(context.tenant_id, "T1");
    }

    #[test]
    fn fallback_header_scopes_tenant() {
        let map = headers(&[(TENANT_HEADER, "  T9 ".to_string())]);
        let context = resolve_tenant(&map, &human_codec()).expect("tenant");
        assert_eq!(context.tenant_id, "T9");
        assert!(context.user.is_none());
    }

    #[test]
    fn invalid_bearer_does_not_fall_back() {
        let map = headers(&[
            ("authorization", "Bearer garbage".to_string()),
            (TENANT_HEADER, "T2".to_string()),
        ]);
        let err = resolve_tenant(&map, &human_codec()).expect_err("invalid");
        assert!(matches!(err, ContextError::InvalidToken(_)));
    }

    #[test]
    fn non_bearer_authorization_is_rejected() {
        let map = headers(&[
            ("authorization", "Basic dXNlcjpwYXNz".to_string()),
            (TENANT_HEADER, "T2".to_string()),
        ]);
        let err = resolve_tenant(&map, &human_codec()).expect_err("basic");
        assert!(matches!(err, ContextError::MissingBearer));
    }

    #[test]
    fn missing_scope_is_tenant_required() {
        let err = resolve_tenant(&HeaderMap::new(), &human_codec()).expect_err("missing");
        assert!(matches!(err, ContextError::TenantRequired));
        let map = headers(&[(TENANT_HEADER, "   ".to_string())]);
        let err = resolve_tenant(&map, &human_codec()).expect_err("blank");
        assert!(matches!(err, ContextError::TenantRequired));
    }

    #[test]
    fn agent_token_is_not_a_human_token() {
        let token = agent_codec()
            .sign(&AgentClaims::new(Uuid::new_v4(), "T1"))
            .expect("sign");
        let map = headers(&[("authorization", format!("Bearer {token}"))]);
        assert!(resolve_tenant(&map, &human_codec()).is_err());
        assert!(resolve_agent(&map, &agent_codec()).is_ok());
    }

    #[test]
    fn agent_context_checks_addressed_id() {
        let agent_id = Uuid::new_v4();
        let token = agent_codec()
            .sign(&AgentClaims::new(agent_id, "T1"))
            .expect("sign");
        let map = headers(&[("authorization", format!("Bearer {token}"))]);
        let context = resolve_agent(&map, &agent_codec()).expect("agent");
        assert_eq!(context.agent_id, agent_id);
        assert_eq!(context.tenant_id, "T1");

        context
            .ensure_addresses(&agent_id.to_string().to_uppercase())
            .expect("same agent");
        assert!(matches!(
            context.ensure_addresses(&Uuid::new_v4().to_string()),
            Err(ContextError::Forbidden)
        ));
        assert!(matches!(
            context.ensure_addresses("not-a-uuid"),
            Err(ContextError::Forbidden)
        ));
    }

    #[test]
    fn agent_route_without_bearer_is_rejected() {
        let err = resolve_agent(&HeaderMap::new(), &agent_codec()).expect_err("missing");
        assert!(matches!(err, ContextError::MissingBearer));
    }
}
