//! HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! This module centralizes route composition to keep `main` small and testable.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::auth::token::{AgentTokenCodec, HumanTokenCodec};
use crate::config::VigilConfig;
use crate::observability;
use crate::store::TrustStore;
use axum::Router;
use axum::routing::{get, patch, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TrustStore + Send + Sync>,
    pub human_tokens: Arc<HumanTokenCodec>,
    pub agent_tokens: Arc<AgentTokenCodec>,
    pub pair_code_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(config: &VigilConfig, store: Arc<dyn TrustStore + Send + Sync>) -> Self {
        let tokens = &config.tokens;
        Self {
            store,
            human_tokens: Arc::new(HumanTokenCodec::new(
                tokens.access_secret.as_bytes(),
                tokens.access_ttl_seconds,
                tokens.leeway_seconds,
            )),
            agent_tokens: Arc::new(AgentTokenCodec::new(
                tokens.agent_secret.as_bytes(),
                tokens.agent_ttl_seconds,
                tokens.leeway_seconds,
            )),
            pair_code_ttl: chrono::Duration::seconds(config.pair_code_ttl_seconds),
            refresh_ttl: chrono::Duration::days(config.refresh_token_days),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                tenant_id = tracing::field::Empty
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route("/v1/system/health", get(api::system::system_health))
        .route("/v1/auth/register", post(api::auth::register))
        .route("/v1/auth/login", post(api::auth::login))
        .route("/v1/auth/refresh", post(api::auth::refresh))
        .route("/v1/auth/logout", post(api::auth::logout))
        .route("/v1/agents", get(api::agents::list_agents))
        .route("/v1/agents/pair-codes", post(api::agents::issue_pair_code))
        .route("/v1/agents/register", post(api::agents::register_agent))
        .route("/v1/agents/token", post(api::agents::exchange_agent_token))
        .route("/v1/agents/:agent_id", patch(api::agents::patch_agent))
        .route(
            "/v1/agents/:agent_id/cameras",
            get(api::agents::agent_cameras),
        )
        .route(
            "/v1/agents/:agent_id/heartbeat",
            post(api::agents::agent_heartbeat),
        )
        .route(
            "/v1/cameras",
            get(api::cameras::list_cameras).post(api::cameras::create_camera),
        )
        .route(
            "/v1/cameras/:camera_id",
            get(api::cameras::get_camera)
                .patch(api::cameras::patch_camera)
                .delete(api::cameras::delete_camera),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
