//! Trust-layer data model.
//!
//! # Purpose
//! Re-exports the persisted entities (users, refresh credentials, pair codes,
//! relay agents, cameras) shared by the store, auth, and API layers.
//!
//! # Notes
//! Every entity carries exactly one tenant id. Tenant ids are opaque strings.
mod agent;
mod camera;
mod user;

pub use agent::{AgentEnrollment, PairCode, RelayAgent};
pub use camera::{
    Camera, CameraCredential, CameraUpdate, DEFAULT_JPEG_QUALITY, DEFAULT_SEND_FPS,
    DEFAULT_SEND_HEIGHT, DEFAULT_SEND_WIDTH, StreamSettings,
};
pub use user::{NewRefreshCredential, RefreshCredential, User};
