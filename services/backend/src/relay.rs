//! Camera credential lifecycle.
//!
//! # Purpose
//! Decides how a camera's RTSP credential is stored on create and on every
//! patch: as plaintext for direct ingestion, or as an envelope sealed for the
//! relay agent that will pull the stream.
//!
//! # Key invariants
//! - The backend never unseals an envelope. Any move away from an agent's key
//!   (to another agent or back to plaintext) needs the plaintext resubmitted.
//! - The assigned agent must belong to the camera's tenant; a foreign agent
//!   looks missing.
//! - Only active agents in the camera's tenant receive new envelopes.
//! - The new credential and agent id are written with a single store update,
//!   conditional on the row being unchanged since it was read.
use crate::model::{
    Camera, CameraCredential, CameraUpdate, DEFAULT_JPEG_QUALITY, DEFAULT_SEND_FPS,
    DEFAULT_SEND_HEIGHT, DEFAULT_SEND_WIDTH, StreamSettings,
};
use crate::store::{StoreError, TrustStore};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use vigil_crypto::{EnvelopeError, RecipientKey, seal_for};

const PLACEHOLDER_SCHEME: &str = "relay://cameras/";
const UPDATE_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("relay target changed without a fresh rtspUrl")]
    MissingPlaintextForReencryption,
    #[error("camera not found")]
    CameraNotFound,
    #[error("relay agent not found")]
    AgentNotFound,
    #[error("relay agent is deactivated")]
    AgentInactive,
    #[error("camera was modified concurrently")]
    ConcurrentUpdate,
    #[error("camera id already exists")]
    AlreadyExists,
    #[error("relay agent public key is unusable")]
    InvalidRecipientKey,
    #[error("sealing camera credential failed: {0}")]
    Seal(EnvelopeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The sealed document an agent decrypts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtspPayload {
    pub rtsp_url: String,
}

/// Partial stream settings; unset fields fall back to the current values.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamPatch {
    pub send_fps: Option<i32>,
    pub send_width: Option<i32>,
    pub send_height: Option<i32>,
    pub jpeg_quality: Option<i32>,
}

impl StreamPatch {
    fn apply_to(self, base: StreamSettings) -> Result<StreamSettings, CredentialError> {
        let settings = StreamSettings {
            send_fps: self.send_fps.unwrap_or(base.send_fps),
            send_width: self.send_width.unwrap_or(base.send_width),
            send_height: self.send_height.unwrap_or(base.send_height),
            jpeg_quality: self.jpeg_quality.unwrap_or(base.jpeg_quality),
        };
        validate_stream(&settings)?;
        Ok(settings)
    }
}

fn validate_stream(settings: &StreamSettings) -> Result<(), CredentialError> {
    if !(1..=30).contains(&settings.send_fps) {
        return Err(CredentialError::Validation("sendFps must be between 1 and 30"));
    }
    if !(16..=3840).contains(&settings.send_width) || !(16..=2160).contains(&settings.send_height)
    {
        return Err(CredentialError::Validation("send resolution is out of range"));
    }
    if !(1..=100).contains(&settings.jpeg_quality) {
        return Err(CredentialError::Validation(
            "jpegQuality must be between 1 and 100",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct NewCamera {
    pub id: Option<String>,
    pub name: String,
    pub rtsp_url: Option<String>,
    pub relay_agent_id: Option<String>,
    pub is_active: Option<bool>,
    pub stream: StreamPatch,
}

/// `relay_agent_id`: `None` keeps the assignment, `Some(None)` detaches,
/// `Some(Some(id))` assigns.
#[derive(Debug, Clone, Default)]
pub struct CameraPatch {
    pub name: Option<String>,
    pub rtsp_url: Option<String>,
    pub relay_agent_id: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub stream: StreamPatch,
}

pub fn placeholder_rtsp_url(camera_id: &str) -> String {
    format!("{PLACEHOLDER_SCHEME}{camera_id}")
}

/// RTSP URL safe to show a tenant actor.
pub fn visible_rtsp_url(camera: &Camera) -> String {
    match &camera.credential {
        CameraCredential::Direct { rtsp_url } => rtsp_url.clone(),
        CameraCredential::Relayed { .. } => placeholder_rtsp_url(&camera.id),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_agent_id(raw: &str) -> Result<Uuid, CredentialError> {
    Uuid::parse_str(raw.trim()).map_err(|_| CredentialError::AgentNotFound)
}

async fn seal_for_agent(
    store: &(dyn TrustStore + Send + Sync),
    tenant_id: &str,
    agent_id: Uuid,
    rtsp_url: String,
) -> Result<CameraCredential, CredentialError> {
    let agent = match store.get_agent(agent_id).await {
        Ok(agent) if agent.tenant_id == tenant_id => agent,
        Ok(_) | Err(StoreError::NotFound(_)) => return Err(CredentialError::AgentNotFound),
        Err(err) => return Err(err.into()),
    };
    if !agent.is_active {
        return Err(CredentialError::AgentInactive);
    }
    let recipient = RecipientKey::from_pem(&agent.public_key_pem)
        .map_err(|_| CredentialError::InvalidRecipientKey)?;
    let envelope =
        seal_for(&recipient, &RtspPayload { rtsp_url }).map_err(CredentialError::Seal)?;
    metrics::counter!("vigil_camera_credentials_sealed_total").increment(1);
    Ok(CameraCredential::Relayed { agent_id, envelope })
}

pub async fn create_camera(
    store: &(dyn TrustStore + Send + Sync),
    tenant_id: &str,
    input: NewCamera,
) -> Result<Camera, CredentialError> {
    let name = non_empty(Some(&input.name))
        .ok_or(CredentialError::Validation("name is required"))?;
    let rtsp_url = non_empty(input.rtsp_url.as_deref())
        .ok_or(CredentialError::Validation("rtspUrl is required"))?;
    let stream = input.stream.apply_to(StreamSettings {
        send_fps: DEFAULT_SEND_FPS,
        send_width: DEFAULT_SEND_WIDTH,
        send_height: DEFAULT_SEND_HEIGHT,
        jpeg_quality: DEFAULT_JPEG_QUALITY,
    })?;
    let id = non_empty(input.id.as_deref()).unwrap_or_else(|| Uuid::new_v4().to_string());

    let credential = match non_empty(input.relay_agent_id.as_deref()) {
        Some(raw) => seal_for_agent(store, tenant_id, parse_agent_id(&raw)?, rtsp_url).await?,
        None => CameraCredential::Direct { rtsp_url },
    };
    let now = Utc::now();
    let camera = Camera {
        id,
        tenant_id: tenant_id.to_string(),
        name,
        is_active: input.is_active.unwrap_or(false),
        stream,
        credential,
        created_at: now,
        updated_at: now,
    };
    match store.create_camera(camera).await {
        Ok(camera) => {
            tracing::info!(
                camera_id = %camera.id,
                relay_agent_id = ?camera.credential.relay_agent_id(),
                "camera created"
            );
            Ok(camera)
        }
        Err(StoreError::Conflict(_)) => Err(CredentialError::AlreadyExists),
        Err(err) => Err(err.into()),
    }
}

pub async fn update_camera(
    store: &(dyn TrustStore + Send + Sync),
    tenant_id: &str,
    camera_id: &str,
    patch: CameraPatch,
) -> Result<Camera, CredentialError> {
    for attempt in 1..=UPDATE_ATTEMPTS {
        let current = match store.get_camera(tenant_id, camera_id).await {
            Ok(camera) => camera,
            Err(StoreError::NotFound(_)) => return Err(CredentialError::CameraNotFound),
            Err(err) => return Err(err.into()),
        };
        let update = plan_update(store, tenant_id, &current, patch.clone()).await?;
        match store
            .update_camera(tenant_id, camera_id, current.updated_at, update)
            .await
        {
            Ok(updated) => {
                tracing::info!(
                    camera_id = %updated.id,
                    from_agent = ?current.credential.relay_agent_id(),
                    to_agent = ?updated.credential.relay_agent_id(),
                    "camera updated"
                );
                return Ok(updated);
            }
            Err(StoreError::Conflict(_)) => {
                tracing::debug!(camera_id, attempt, "camera changed under update, rereading");
            }
            Err(StoreError::NotFound(_)) => return Err(CredentialError::CameraNotFound),
            Err(err) => return Err(err.into()),
        }
    }
    Err(CredentialError::ConcurrentUpdate)
}

/// Apply `patch` on top of `current`, sealing a new envelope when needed.
async fn plan_update(
    store: &(dyn TrustStore + Send + Sync),
    tenant_id: &str,
    current: &Camera,
    patch: CameraPatch,
) -> Result<CameraUpdate, CredentialError> {
    let name = match patch.name.as_deref() {
        Some(raw) => non_empty(Some(raw)).ok_or(CredentialError::Validation("name must not be empty"))?,
        None => current.name.clone(),
    };
    let rtsp_url = match patch.rtsp_url.as_deref() {
        Some(raw) => Some(
            non_empty(Some(raw)).ok_or(CredentialError::Validation("rtspUrl must not be empty"))?,
        ),
        None => None,
    };
    let target_agent = match patch.relay_agent_id.as_ref() {
        None => current.credential.relay_agent_id(),
        Some(None) => None,
        Some(Some(raw)) => match non_empty(Some(raw)) {
            Some(raw) => Some(parse_agent_id(&raw)?),
            None => None,
        },
    };
    let stream = patch.stream.apply_to(current.stream)?;
    let credential =
        transition(store, tenant_id, &current.credential, target_agent, rtsp_url).await?;
    Ok(CameraUpdate {
        name,
        is_active: patch.is_active.unwrap_or(current.is_active),
        stream,
        credential,
        updated_at: next_version(current.updated_at),
    })
}

/// Strictly later than `previous`, at a precision every backend keeps.
fn next_version(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + Duration::microseconds(1))
}

async fn transition(
    store: &(dyn TrustStore + Send + Sync),
    tenant_id: &str,
    current: &CameraCredential,
    target_agent: Option<Uuid>,
    rtsp_url: Option<String>,
) -> Result<CameraCredential, CredentialError> {
    match (current, target_agent, rtsp_url) {
        (CameraCredential::Direct { .. }, None, Some(rtsp_url)) => {
            Ok(CameraCredential::Direct { rtsp_url })
        }
        (CameraCredential::Direct { .. }, None, None) => Ok(current.clone()),
        (CameraCredential::Direct { .. }, Some(agent_id), Some(rtsp_url)) => {
            seal_for_agent(store, tenant_id, agent_id, rtsp_url).await
        }
        (CameraCredential::Direct { .. }, Some(_), None) => Err(CredentialError::Validation(
            "rtspUrl is required to assign a relay agent",
        )),
        (CameraCredential::Relayed { agent_id, .. }, Some(target), None) if *agent_id == target => {
            Ok(current.clone())
        }
        (CameraCredential::Relayed { .. }, Some(target), Some(rtsp_url)) => {
            seal_for_agent(store, tenant_id, target, rtsp_url).await
        }
        (CameraCredential::Relayed { .. }, None, Some(rtsp_url)) => {
            Ok(CameraCredential::Direct { rtsp_url })
        }
        (CameraCredential::Relayed { .. }, _, None) => {
            Err(CredentialError::MissingPlaintextForReencryption)
        }
    }
}

pub async fn delete_camera(
    store: &(dyn TrustStore + Send + Sync),
    tenant_id: &str,
    camera_id: &str,
) -> Result<(), CredentialError> {
    match store.delete_camera(tenant_id, camera_id).await {
        Ok(()) => {
            tracing::info!(camera_id, "camera deleted");
            Ok(())
        }
        Err(StoreError::NotFound(_)) => Err(CredentialError::CameraNotFound),
        Err(err) => Err(err.into()),
    }
}
