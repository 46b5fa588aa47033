//! Camera records and their credential storage mode.
//!
//! # Key invariants
//! - A camera's RTSP credential is either plaintext (`Direct`) or an envelope
//!   sealed for exactly one relay agent (`Relayed`). Never both, never neither.
//! - The relay agent id is only reachable through `CameraCredential::Relayed`.
use chrono::{DateTime, Utc};
use uuid::Uuid;
use vigil_crypto::EnvelopeBundle;

pub const DEFAULT_SEND_FPS: i32 = 2;
pub const DEFAULT_SEND_WIDTH: i32 = 640;
pub const DEFAULT_SEND_HEIGHT: i32 = 360;
pub const DEFAULT_JPEG_QUALITY: i32 = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraCredential {
    Direct {
        rtsp_url: String,
    },
    Relayed {
        agent_id: Uuid,
        envelope: EnvelopeBundle,
    },
}

impl CameraCredential {
    pub fn relay_agent_id(&self) -> Option<Uuid> {
        match self {
            CameraCredential::Direct { .. } => None,
            CameraCredential::Relayed { agent_id, .. } => Some(*agent_id),
        }
    }

    /// Rebuild from the nullable column triple used by durable backends.
    ///
    /// Returns `None` when the columns violate the one-of invariant.
    pub fn from_parts(
        relay_agent_id: Option<Uuid>,
        rtsp_plaintext: Option<String>,
        rtsp_envelope: Option<EnvelopeBundle>,
    ) -> Option<Self> {
        match (relay_agent_id, rtsp_plaintext, rtsp_envelope) {
            (None, Some(rtsp_url), None) => Some(CameraCredential::Direct { rtsp_url }),
            (Some(agent_id), None, Some(envelope)) => {
                Some(CameraCredential::Relayed { agent_id, envelope })
            }
            _ => None,
        }
    }

    pub fn into_parts(self) -> (Option<Uuid>, Option<String>, Option<EnvelopeBundle>) {
        match self {
            CameraCredential::Direct { rtsp_url } => (None, Some(rtsp_url), None),
            CameraCredential::Relayed { agent_id, envelope } => {
                (Some(agent_id), None, Some(envelope))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub send_fps: i32,
    pub send_width: i32,
    pub send_height: i32,
    pub jpeg_quality: i32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            send_fps: DEFAULT_SEND_FPS,
            send_width: DEFAULT_SEND_WIDTH,
            send_height: DEFAULT_SEND_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub is_active: bool,
    pub stream: StreamSettings,
    pub credential: CameraCredential,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full replacement of a camera's mutable fields, applied as one store write.
#[derive(Debug, Clone)]
pub struct CameraUpdate {
    pub name: String,
    pub is_active: bool,
    pub stream: StreamSettings,
    pub credential: CameraCredential,
    pub updated_at: DateTime<Utc>,
}

impl Camera {
    pub fn apply(&mut self, update: CameraUpdate) {
        self.name = update.name;
        self.is_active = update.is_active;
        self.stream = update.stream;
        self.credential = update.credential;
        self.updated_at = update.updated_at;
    }
}
