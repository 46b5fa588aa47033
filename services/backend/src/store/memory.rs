//! In-memory implementation of the trust store.
//!
//! # Purpose
//! Implements `TrustStore` with `HashMap`s guarded by `tokio::sync::RwLock`.
//! Used for local development, tests, and deployments without durability
//! requirements.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Multi-entity operations take every lock they touch before reading, in a
//!   fixed order (users, refresh credentials, pair codes, agents, cameras), and
//!   hold them until the write completes. Pair-code redemption therefore cannot
//!   interleave with another redemption of the same code.
use super::{StoreError, StoreResult, TrustStore};
use crate::model::{
    AgentEnrollment, Camera, CameraUpdate, PairCode, RefreshCredential, RelayAgent, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

type CameraKey = (String, String);

#[derive(Default)]
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    /// Keyed by secret hash.
    refresh_credentials: Arc<RwLock<HashMap<String, RefreshCredential>>>,
    pair_codes: Arc<RwLock<HashMap<String, PairCode>>>,
    agents: Arc<RwLock<HashMap<Uuid, RelayAgent>>>,
    /// Keyed by `(tenant_id, camera_id)`.
    cameras: Arc<RwLock<HashMap<CameraKey, Camera>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn camera_key(tenant_id: &str, camera_id: &str) -> CameraKey {
    (tenant_id.to_string(), camera_id.to_string())
}

#[async_trait]
impl TrustStore for InMemoryStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::Conflict("email already registered".into()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("user".into()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn insert_refresh_credential(&self, credential: RefreshCredential) -> StoreResult<()> {
        let mut credentials = self.refresh_credentials.write().await;
        if credentials.contains_key(&credential.secret_hash) {
            return Err(StoreError::Conflict("refresh credential exists".into()));
        }
        credentials.insert(credential.secret_hash.clone(), credential);
        Ok(())
    }

    async fn find_refresh_credential(
        &self,
        secret_hash: &str,
    ) -> StoreResult<Option<RefreshCredential>> {
        Ok(self
            .refresh_credentials
            .read()
            .await
            .get(secret_hash)
            .cloned())
    }

    async fn revoke_refresh_credential(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut credentials = self.refresh_credentials.write().await;
        let credential = credentials
            .values_mut()
            .find(|credential| credential.id == id)
            .ok_or_else(|| StoreError::NotFound("refresh credential".into()))?;
        if credential.revoked_at.is_some() {
            return Ok(false);
        }
        credential.revoked_at = Some(at);
        Ok(true)
    }

    async fn insert_pair_code(&self, code: PairCode) -> StoreResult<PairCode> {
        let mut codes = self.pair_codes.write().await;
        if codes.contains_key(&code.code) {
            return Err(StoreError::Conflict("pair code exists".into()));
        }
        codes.insert(code.code.clone(), code.clone());
        Ok(code)
    }

    async fn redeem_pair_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
        enrollment: AgentEnrollment,
    ) -> StoreResult<RelayAgent> {
        let mut codes = self.pair_codes.write().await;
        let mut agents = self.agents.write().await;
        let pair_code = codes
            .get(code)
            .ok_or_else(|| StoreError::NotFound("pair code".into()))?;
        if pair_code.is_expired_at(now) {
            return Err(StoreError::Expired("pair code".into()));
        }
        if agents.contains_key(&enrollment.id) {
            return Err(StoreError::Conflict("agent exists".into()));
        }
        let agent = enrollment.bind(pair_code);
        codes.remove(code);
        agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, agent_id: Uuid) -> StoreResult<RelayAgent> {
        self.agents
            .read()
            .await
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("agent".into()))
    }

    async fn list_agents(&self, tenant_id: &str) -> StoreResult<Vec<RelayAgent>> {
        let mut items: Vec<RelayAgent> = self
            .agents
            .read()
            .await
            .values()
            .filter(|agent| agent.tenant_id == tenant_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn touch_agent(&self, agent_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| StoreError::NotFound("agent".into()))?;
        agent.last_seen_at = Some(at);
        agent.updated_at = at;
        Ok(())
    }

    async fn set_agent_active(
        &self,
        agent_id: Uuid,
        is_active: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<RelayAgent> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| StoreError::NotFound("agent".into()))?;
        agent.is_active = is_active;
        agent.updated_at = at;
        Ok(agent.clone())
    }

    async fn list_cameras(&self, tenant_id: &str) -> StoreResult<Vec<Camera>> {
        let mut items: Vec<Camera> = self
            .cameras
            .read()
            .await
            .values()
            .filter(|camera| camera.tenant_id == tenant_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn list_agent_cameras(
        &self,
        tenant_id: &str,
        agent_id: Uuid,
    ) -> StoreResult<Vec<Camera>> {
        let mut items: Vec<Camera> = self
            .cameras
            .read()
            .await
            .values()
            .filter(|camera| {
                camera.tenant_id == tenant_id
                    && camera.credential.relay_agent_id() == Some(agent_id)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn get_camera(&self, tenant_id: &str, camera_id: &str) -> StoreResult<Camera> {
        self.cameras
            .read()
            .await
            .get(&camera_key(tenant_id, camera_id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound("camera".into()))
    }

    async fn create_camera(&self, camera: Camera) -> StoreResult<Camera> {
        let mut cameras = self.cameras.write().await;
        let key = camera_key(&camera.tenant_id, &camera.id);
        if cameras.contains_key(&key) {
            return Err(StoreError::Conflict("camera exists".into()));
        }
        cameras.insert(key, camera.clone());
        Ok(camera)
    }

    async fn update_camera(
        &self,
        tenant_id: &str,
        camera_id: &str,
        expected_updated_at: DateTime<Utc>,
        update: CameraUpdate,
    ) -> StoreResult<Camera> {
        let mut cameras = self.cameras.write().await;
        let camera = cameras
            .get_mut(&camera_key(tenant_id, camera_id))
            .ok_or_else(|| StoreError::NotFound("camera".into()))?;
        if camera.updated_at != expected_updated_at {
            return Err(StoreError::Conflict("camera changed since read".into()));
        }
        camera.apply(update);
        Ok(camera.clone())
    }

    async fn delete_camera(&self, tenant_id: &str, camera_id: &str) -> StoreResult<()> {
        self.cameras
            .write()
            .await
            .remove(&camera_key(tenant_id, camera_id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("camera".into()))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
