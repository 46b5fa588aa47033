//! OpenAPI schema aggregation.
//!
//! # Purpose
//! Collects all routes and schema types into a single OpenAPI document for docs
//! and client generation.
use crate::api::{
    agents, auth, cameras, system,
    types::{
        AccessTokenResponse, AgentCameraView, AgentPatchRequest, AgentRegisterRequest,
        AgentRegisterResponse, AgentTokenRequest, AgentView, CameraCreateRequest,
        CameraPatchRequest, CameraView, EnvelopeView, ErrorResponse, HealthStatus,
        HeartbeatResponse, LoginRequest, OkResponse, PairCodeRequest, PairCodeResponse,
        RefreshTokenRequest, RegisterRequest, SessionResponse, UserView,
    },
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "vigil-backend",
        version = "v1",
        description = "Vigil trust and credential-relay HTTP API"
    ),
    paths(
        system::system_health,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        agents::issue_pair_code,
        agents::register_agent,
        agents::exchange_agent_token,
        agents::list_agents,
        agents::patch_agent,
        agents::agent_cameras,
        agents::agent_heartbeat,
        cameras::list_cameras,
        cameras::create_camera,
        cameras::get_camera,
        cameras::patch_camera,
        cameras::delete_camera
    ),
    components(schemas(
        ErrorResponse,
        HealthStatus,
        RegisterRequest,
        LoginRequest,
        RefreshTokenRequest,
        UserView,
        SessionResponse,
        AccessTokenResponse,
        OkResponse,
        PairCodeRequest,
        PairCodeResponse,
        AgentRegisterRequest,
        AgentRegisterResponse,
        AgentTokenRequest,
        AgentPatchRequest,
        AgentView,
        HeartbeatResponse,
        EnvelopeView,
        AgentCameraView,
        CameraCreateRequest,
        CameraPatchRequest,
        CameraView
    )),
    modifiers(&BearerScheme),
    tags(
        (name = "system", description = "Health"),
        (name = "auth", description = "Human sessions"),
        (name = "agents", description = "Pairing, agent tokens and relay feeds"),
        (name = "cameras", description = "Camera credentials")
    )
)]
pub struct ApiDoc;
