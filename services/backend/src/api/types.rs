//! HTTP API request/response types.
//!
//! # Purpose
//! Defines the JSON payload shapes of the REST API and their OpenAPI schemas.
//! Field names are camelCase on the wire.
use crate::model::{Camera, CameraCredential, RelayAgent, User};
use crate::relay::{StreamPatch, visible_rtsp_url};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use vigil_crypto::EnvelopeBundle;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub storage: String,
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ---- human sessions ----

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    pub tenant_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub tenant_id: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            is_active: user.is_active,
            tenant_id: user.tenant_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: UserView,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct OkResponse {
    pub ok: bool,
}

// ---- agents ----

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PairCodeRequest {
    pub agent_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PairCodeResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegisterRequest {
    pub code: String,
    pub public_key_pem: String,
}

/// `refreshToken` is returned exactly once.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegisterResponse {
    pub agent_id: Uuid,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentTokenRequest {
    pub agent_id: String,
    #[serde(alias = "refreshSecret")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatchRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RelayAgent> for AgentView {
    fn from(agent: RelayAgent) -> Self {
        Self {
            id: agent.id,
            name: agent.name,
            is_active: agent.is_active,
            last_seen_at: agent.last_seen_at,
            created_at: agent.created_at,
            updated_at: agent.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub ok: bool,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeView {
    pub enc_key: String,
    pub iv: String,
    pub tag: String,
    pub ciphertext: String,
}

impl From<EnvelopeBundle> for EnvelopeView {
    fn from(bundle: EnvelopeBundle) -> Self {
        Self {
            enc_key: bundle.enc_key,
            iv: bundle.iv,
            tag: bundle.tag,
            ciphertext: bundle.ciphertext,
        }
    }
}

/// Relay agents read the sealed credential as a JSON document encoded into a
/// string.
mod sealed_string {
    use super::EnvelopeView;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        envelope: &EnvelopeView,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded = serde_json::to_string(envelope).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<EnvelopeView, D::Error> {
        let raw = String::deserialize(deserializer)?;
        serde_json::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// What a relay agent needs to pull one camera.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentCameraView {
    pub id: String,
    pub name: String,
    /// `{"encKey","iv","tag","ciphertext"}` serialized to a string.
    #[serde(with = "sealed_string")]
    #[schema(value_type = String)]
    pub rtsp_url_enc: EnvelopeView,
    pub send_fps: i32,
    pub send_width: i32,
    pub send_height: i32,
    pub jpeg_quality: i32,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl AgentCameraView {
    /// `None` for a camera that is not relayed.
    pub fn from_camera(camera: Camera) -> Option<Self> {
        let CameraCredential::Relayed { envelope, .. } = camera.credential else {
            return None;
        };
        Some(Self {
            id: camera.id,
            name: camera.name,
            rtsp_url_enc: envelope.into(),
            send_fps: camera.stream.send_fps,
            send_width: camera.stream.send_width,
            send_height: camera.stream.send_height,
            jpeg_quality: camera.stream.jpeg_quality,
            is_active: camera.is_active,
            updated_at: camera.updated_at,
        })
    }
}

// ---- cameras ----

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CameraCreateRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub rtsp_url: Option<String>,
    #[serde(default)]
    pub relay_agent_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub send_fps: Option<i32>,
    #[serde(default)]
    pub send_width: Option<i32>,
    #[serde(default)]
    pub send_height: Option<i32>,
    #[serde(default)]
    pub jpeg_quality: Option<i32>,
}

/// `relayAgentId`: absent keeps the assignment, `null` detaches, a string assigns.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CameraPatchRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rtsp_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>, nullable)]
    pub relay_agent_id: Option<Option<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub send_fps: Option<i32>,
    #[serde(default)]
    pub send_width: Option<i32>,
    #[serde(default)]
    pub send_height: Option<i32>,
    #[serde(default)]
    pub jpeg_quality: Option<i32>,
}

impl CameraCreateRequest {
    pub fn stream_patch(&self) -> StreamPatch {
        StreamPatch {
            send_fps: self.send_fps,
            send_width: self.send_width,
            send_height: self.send_height,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

impl CameraPatchRequest {
    pub fn stream_patch(&self) -> StreamPatch {
        StreamPatch {
            send_fps: self.send_fps,
            send_width: self.send_width,
            send_height: self.send_height,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

/// Tenant-facing camera. Relayed cameras show a placeholder URL and no envelope.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CameraView {
    pub id: String,
    pub name: String,
    pub rtsp_url: String,
    pub relay_agent_id: Option<Uuid>,
    pub is_active: bool,
    pub send_fps: i32,
    pub send_width: i32,
    pub send_height: i32,
    pub jpeg_quality: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Camera> for CameraView {
    fn from(camera: Camera) -> Self {
        Self {
            rtsp_url: visible_rtsp_url(&camera),
            relay_agent_id: camera.credential.relay_agent_id(),
            id: camera.id,
            name: camera.name,
            is_active: camera.is_active,
            send_fps: camera.stream.send_fps,
            send_width: camera.stream.send_width,
            send_height: camera.stream.send_height,
            jpeg_quality: camera.stream.jpeg_quality,
            created_at: camera.created_at,
            updated_at: camera.updated_at,
        }
    }
}
