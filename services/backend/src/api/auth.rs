//! Human session API handlers.
//!
//! # Purpose
//! Register, login, refresh and logout for tenant users. Refresh and logout
//! carry the refresh secret in the body; no bearer is required.
use crate::api::error::ApiError;
use crate::api::types::{
    AccessTokenResponse, LoginRequest, OkResponse, RefreshTokenRequest, RegisterRequest,
    SessionResponse,
};
use crate::app::AppState;
use crate::auth::session::{self, ClientInfo, IssuedSession, Registration};
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// First hop of `x-forwarded-for` plus the user agent.
fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    ClientInfo {
        ip: header_value(FORWARDED_FOR)
            .and_then(|value| value.split(',').next())
            .map(|ip| ip.trim().to_string()),
        user_agent: header_value(header::USER_AGENT.as_str()).map(str::to_string),
    }
}

fn session_response(issued: IssuedSession) -> SessionResponse {
    SessionResponse {
        user: issued.user.into(),
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
        expires_in: issued.expires_in,
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered and signed in", body = SessionResponse),
        (status = 400, description = "Invalid input", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issued = session::register(
        state.store.as_ref(),
        &state.human_tokens,
        state.refresh_ttl,
        Registration {
            email: body.email,
            password: body.password,
            name: body.name,
            tenant_id: body.tenant_id,
        },
        client_info(&headers),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(session_response(issued))))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let issued = session::login(
        state.store.as_ref(),
        &state.human_tokens,
        state.refresh_ttl,
        &body.email,
        &body.password,
        client_info(&headers),
    )
    .await?;
    Ok(Json(session_response(issued)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 401, description = "Refresh token missing, revoked or expired", body = crate::api::types::ErrorResponse),
        (status = 403, description = "User disabled", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let refreshed =
        session::refresh(state.store.as_ref(), &state.human_tokens, &body.refresh_token).await?;
    Ok(Json(AccessTokenResponse {
        access_token: refreshed.access_token,
        expires_in: refreshed.expires_in,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Refresh token revoked", body = OkResponse),
        (status = 400, description = "Missing refresh token", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    session::logout(state.store.as_ref(), &body.refresh_token).await?;
    Ok(Json(OkResponse { ok: true }))
}
