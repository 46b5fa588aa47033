//! Camera API handlers.
//!
//! # Purpose
//! Tenant-scoped camera CRUD. Create and patch run through the relay
//! credential lifecycle; reads never expose an envelope or a relayed URL.
use crate::api::error::{ApiError, api_internal, api_not_found};
use crate::api::types::{CameraCreateRequest, CameraPatchRequest, CameraView};
use crate::app::AppState;
use crate::auth::context::TenantContext;
use crate::relay::{self, CameraPatch, NewCamera};
use crate::store::StoreError;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

#[utoipa::path(
    get,
    path = "/v1/cameras",
    tag = "cameras",
    responses(
        (status = 200, description = "Cameras of the caller's tenant", body = [CameraView]),
        (status = 400, description = "Missing tenant scope", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_cameras(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<CameraView>>, ApiError> {
    let cameras = state
        .store
        .list_cameras(&tenant.tenant_id)
        .await
        .map_err(|err| api_internal("failed to list cameras", &err))?;
    Ok(Json(cameras.into_iter().map(CameraView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/v1/cameras",
    tag = "cameras",
    request_body = CameraCreateRequest,
    responses(
        (status = 201, description = "Camera created", body = CameraView),
        (status = 400, description = "Invalid input", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Relay agent not in this tenant", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Camera id already exists", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_camera(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<CameraCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let stream = body.stream_patch();
    let camera = relay::create_camera(
        state.store.as_ref(),
        &tenant.tenant_id,
        NewCamera {
            id: body.id,
            name: body.name,
            rtsp_url: body.rtsp_url,
            relay_agent_id: body.relay_agent_id,
            is_active: body.is_active,
            stream,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(CameraView::from(camera))))
}

#[utoipa::path(
    get,
    path = "/v1/cameras/{camera_id}",
    tag = "cameras",
    params(("camera_id" = String, Path, description = "Camera id")),
    responses(
        (status = 200, description = "Fetch camera", body = CameraView),
        (status = 404, description = "Camera not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_camera(
    Path(camera_id): Path<String>,
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<CameraView>, ApiError> {
    match state.store.get_camera(&tenant.tenant_id, &camera_id).await {
        Ok(camera) => Ok(Json(camera.into())),
        Err(StoreError::NotFound(_)) => Err(api_not_found("camera not found")),
        Err(err) => Err(api_internal("failed to fetch camera", &err)),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/cameras/{camera_id}",
    tag = "cameras",
    params(("camera_id" = String, Path, description = "Camera id")),
    request_body = CameraPatchRequest,
    responses(
        (status = 200, description = "Camera updated", body = CameraView),
        (status = 400, description = "Invalid input", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Camera or relay agent not found", body = crate::api::types::ErrorResponse),
        (status = 422, description = "Relay target changed without rtspUrl", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn patch_camera(
    Path(camera_id): Path<String>,
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<CameraPatchRequest>,
) -> Result<Json<CameraView>, ApiError> {
    let stream = body.stream_patch();
    let camera = relay::update_camera(
        state.store.as_ref(),
        &tenant.tenant_id,
        &camera_id,
        CameraPatch {
            name: body.name,
            rtsp_url: body.rtsp_url,
            relay_agent_id: body.relay_agent_id,
            is_active: body.is_active,
            stream,
        },
    )
    .await?;
    Ok(Json(camera.into()))
}

#[utoipa::path(
    delete,
    path = "/v1/cameras/{camera_id}",
    tag = "cameras",
    params(("camera_id" = String, Path, description = "Camera id")),
    responses(
        (status = 204, description = "Camera deleted"),
        (status = 404, description = "Camera not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_camera(
    Path(camera_id): Path<String>,
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<StatusCode, ApiError> {
    relay::delete_camera(state.store.as_ref(), &tenant.tenant_id, &camera_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
