//! Persistence boundary for the trust layer.
//!
//! # Purpose
//! Defines the `TrustStore` trait shared by every backend plus the common
//! error type. Handlers and services only ever see
//! `Arc<dyn TrustStore + Send + Sync>`.
//!
//! # Key invariants
//! - Pair-code redemption (find, delete, create agent) is one atomic operation.
//! - A camera's relay agent id and credential are written together, and only
//!   over the version of the row the caller read.
//! - Tenant-scoped reads never return rows from another tenant; a foreign row
//!   looks exactly like a missing one.
use crate::model::{
    AgentEnrollment, Camera, CameraUpdate, PairCode, RefreshCredential, RelayAgent, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("expired: {0}")]
    Expired(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, user: User) -> StoreResult<User>;
    async fn get_user(&self, user_id: Uuid) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn insert_refresh_credential(&self, credential: RefreshCredential) -> StoreResult<()>;
    async fn find_refresh_credential(
        &self,
        secret_hash: &str,
    ) -> StoreResult<Option<RefreshCredential>>;
    /// Sets `revoked_at` if unset. Returns whether this call revoked it.
    async fn revoke_refresh_credential(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Fails with `Conflict` when the code is already live.
    async fn insert_pair_code(&self, code: PairCode) -> StoreResult<PairCode>;
    /// Consume `code` and create the agent it enrolls, atomically.
    ///
    /// `NotFound` if the code does not exist (including a lost race),
    /// `Expired` if `now >= expires_at`. An expired code is left in place.
    async fn redeem_pair_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
        enrollment: AgentEnrollment,
    ) -> StoreResult<RelayAgent>;

    async fn get_agent(&self, agent_id: Uuid) -> StoreResult<RelayAgent>;
    async fn list_agents(&self, tenant_id: &str) -> StoreResult<Vec<RelayAgent>>;
    async fn touch_agent(&self, agent_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    async fn set_agent_active(
        &self,
        agent_id: Uuid,
        is_active: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<RelayAgent>;

    async fn list_cameras(&self, tenant_id: &str) -> StoreResult<Vec<Camera>>;
    async fn list_agent_cameras(&self, tenant_id: &str, agent_id: Uuid)
    -> StoreResult<Vec<Camera>>;
    async fn get_camera(&self, tenant_id: &str, camera_id: &str) -> StoreResult<Camera>;
    async fn create_camera(&self, camera: Camera) -> StoreResult<Camera>;
    /// Writes only if the row still carries `expected_updated_at`; a row that
    /// moved on since it was read fails with `Conflict`.
    async fn update_camera(
        &self,
        tenant_id: &str,
        camera_id: &str,
        expected_updated_at: DateTime<Utc>,
        update: CameraUpdate,
    ) -> StoreResult<Camera>;
    async fn delete_camera(&self, tenant_id: &str, camera_id: &str) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
