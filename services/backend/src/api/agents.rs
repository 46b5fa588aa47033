//! Relay agent API handlers.
//!
//! # Purpose
//! Pairing (issue and redeem), agent token exchange, liveness, the agent's
//! camera feed, and tenant-side agent administration.
//!
//! # Security considerations
//! - `register` and `token` are public; the pair code and refresh secret are
//!   the credentials.
//! - Agent-scoped routes compare the path id with the token's agent id.
use crate::api::error::{ApiError, api_internal, api_not_found};
use crate::api::types::{
    AgentCameraView, AgentPatchRequest, AgentRegisterRequest, AgentRegisterResponse,
    AgentTokenRequest, AccessTokenResponse, AgentView, HeartbeatResponse, PairCodeRequest,
    PairCodeResponse,
};
use crate::app::AppState;
use crate::auth::agent_session;
use crate::auth::context::{AgentContext, TenantContext};
use crate::auth::pairing;
use crate::store::StoreError;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/v1/agents/pair-codes",
    tag = "agents",
    request_body = PairCodeRequest,
    responses(
        (status = 201, description = "Pair code issued", body = PairCodeResponse),
        (status = 400, description = "Missing agent name or tenant scope", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Invalid bearer token", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn issue_pair_code(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<PairCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = pairing::issue_pair_code(
        state.store.as_ref(),
        &tenant.tenant_id,
        &body.agent_name,
        state.pair_code_ttl,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(PairCodeResponse {
            code: code.code,
            expires_at: code.expires_at,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/agents/register",
    tag = "agents",
    request_body = AgentRegisterRequest,
    responses(
        (status = 201, description = "Agent paired; refresh token shown once", body = AgentRegisterResponse),
        (status = 400, description = "Missing fields or unusable public key", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Unknown or already redeemed code", body = crate::api::types::ErrorResponse),
        (status = 410, description = "Code expired", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn register_agent(
    State(state): State<AppState>,
    Json(body): Json<AgentRegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let redemption =
        pairing::redeem_pair_code(state.store.as_ref(), &body.code, &body.public_key_pem).await?;
    Ok((
        StatusCode::CREATED,
        Json(AgentRegisterResponse {
            agent_id: redemption.agent.id,
            refresh_token: redemption.refresh_secret,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/agents/token",
    tag = "agents",
    request_body = AgentTokenRequest,
    responses(
        (status = 200, description = "Agent access token", body = AccessTokenResponse),
        (status = 401, description = "Refresh token does not match", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Agent deactivated", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Unknown agent", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn exchange_agent_token(
    State(state): State<AppState>,
    Json(body): Json<AgentTokenRequest>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let Ok(agent_id) = Uuid::parse_str(body.agent_id.trim()) else {
        return Err(api_not_found("agent not found"));
    };
    let issued = agent_session::exchange_agent_secret(
        state.store.as_ref(),
        &state.agent_tokens,
        agent_id,
        body.refresh_token.trim(),
    )
    .await?;
    Ok(Json(AccessTokenResponse {
        access_token: issued.access_token,
        expires_in: issued.expires_in,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/agents",
    tag = "agents",
    responses(
        (status = 200, description = "Agents of the caller's tenant, newest first", body = [AgentView])
    )
)]
pub(crate) async fn list_agents(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<AgentView>>, ApiError> {
    let agents = state
        .store
        .list_agents(&tenant.tenant_id)
        .await
        .map_err(|err| api_internal("failed to list agents", &err))?;
    Ok(Json(agents.into_iter().map(AgentView::from).collect()))
}

#[utoipa::path(
    patch,
    path = "/v1/agents/{agent_id}",
    tag = "agents",
    params(("agent_id" = String, Path, description = "Relay agent id")),
    request_body = AgentPatchRequest,
    responses(
        (status = 200, description = "Agent updated", body = AgentView),
        (status = 404, description = "No such agent in this tenant", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn patch_agent(
    Path(agent_id): Path<String>,
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<AgentPatchRequest>,
) -> Result<Json<AgentView>, ApiError> {
    let Ok(agent_id) = Uuid::parse_str(&agent_id) else {
        return Err(api_not_found("agent not found"));
    };
    match state.store.get_agent(agent_id).await {
        Ok(agent) if agent.tenant_id == tenant.tenant_id => {}
        Ok(_) | Err(StoreError::NotFound(_)) => return Err(api_not_found("agent not found")),
        Err(err) => return Err(api_internal("failed to load agent", &err)),
    }
    let agent = state
        .store
        .set_agent_active(agent_id, body.is_active, Utc::now())
        .await
        .map_err(|err| match err {
            StoreError::NotFound(_) => api_not_found("agent not found"),
            other => api_internal("failed to update agent", &other),
        })?;
    tracing::info!(agent_id = %agent.id, is_active = agent.is_active, "relay agent updated");
    Ok(Json(agent.into()))
}

#[utoipa::path(
    get,
    path = "/v1/agents/{agent_id}/cameras",
    tag = "agents",
    params(("agent_id" = String, Path, description = "Relay agent id; must match the token")),
    responses(
        (status = 200, description = "Cameras assigned to the agent, ordered by id", body = [AgentCameraView]),
        (status = 401, description = "Missing or invalid agent token", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Token belongs to another agent or the agent is deactivated", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn agent_cameras(
    Path(agent_id): Path<String>,
    State(state): State<AppState>,
    agent: AgentContext,
) -> Result<Json<Vec<AgentCameraView>>, ApiError> {
    agent_session::require_active(state.store.as_ref(), &agent, &agent_id).await?;
    let cameras = state
        .store
        .list_agent_cameras(&agent.tenant_id, agent.agent_id)
        .await
        .map_err(|err| api_internal("failed to list agent cameras", &err))?;
    Ok(Json(
        cameras
            .into_iter()
            .filter_map(AgentCameraView::from_camera)
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/agents/{agent_id}/heartbeat",
    tag = "agents",
    params(("agent_id" = String, Path, description = "Relay agent id; must match the token")),
    responses(
        (status = 200, description = "Liveness recorded", body = HeartbeatResponse),
        (status = 403, description = "Token belongs to another agent", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn agent_heartbeat(
    Path(agent_id): Path<String>,
    State(state): State<AppState>,
    agent: AgentContext,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let last_seen_at =
        agent_session::record_heartbeat(state.store.as_ref(), &agent, &agent_id).await?;
    Ok(Json(HeartbeatResponse {
        ok: true,
        last_seen_at,
    }))
}
