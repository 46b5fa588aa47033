//! Postgres-backed implementation of the trust store.
//!
//! # What this module is
//! Implements `TrustStore` on top of `sqlx` for durable, multi-instance
//! deployments. The schema lives in `migrations/` and is applied at startup.
//!
//! # Key invariants
//! - Pair-code redemption runs in one transaction: `DELETE ... RETURNING` on
//!   the code, then the agent insert. An expired code rolls the delete back.
//!   Two racing redemptions serialize on the row lock; the loser's delete
//!   returns no row and surfaces as `NotFound`.
//! - Camera credential columns are written by a single `UPDATE`, and a CHECK
//!   constraint enforces the plaintext/envelope one-of rule.
//! - Rows that violate the credential invariant are rejected on load rather
//!   than silently repaired.
//!
//! # Security notes
//! - Database URLs may contain credentials; never log them.
//! - Only hashes of refresh secrets are stored. Envelopes are opaque to the
//!   service.
use super::{StoreError, StoreResult, TrustStore};
use crate::config::PostgresConfig;
use crate::model::{
    AgentEnrollment, Camera, CameraCredential, CameraUpdate, PairCode, RefreshCredential,
    RelayAgent, StreamSettings, User,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;
use vigil_crypto::EnvelopeBundle;

const CAMERA_COLUMNS: &str = "tenant_id, id, name, is_active, send_fps, send_width, \
     send_height, jpeg_quality, relay_agent_id, rtsp_plaintext, rtsp_envelope, created_at, \
     updated_at";
const AGENT_COLUMNS: &str = "id, name, tenant_id, public_key_pem, refresh_secret_hash, \
     is_active, last_seen_at, created_at, updated_at";
const USER_COLUMNS: &str =
    "id, email, password_hash, name, role, is_active, tenant_id, created_at";
const REFRESH_COLUMNS: &str = "id, secret_hash, user_id, expires_at, revoked_at, issued_ip, \
     issued_user_agent, created_at";

/// Durable trust store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use vigil_backend::config::PostgresConfig;
/// use vigil_backend::store::postgres::PostgresStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresStore::connect(&pg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    email: String,
    password_hash: String,
    name: Option<String>,
    role: String,
    is_active: bool,
    tenant_id: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbRefreshCredential {
    id: Uuid,
    secret_hash: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    issued_ip: Option<String>,
    issued_user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbPairCode {
    code: String,
    tenant_id: String,
    agent_name: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbRelayAgent {
    id: Uuid,
    name: String,
    tenant_id: String,
    public_key_pem: String,
    refresh_secret_hash: String,
    is_active: bool,
    last_seen_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbCamera {
    tenant_id: String,
    id: String,
    name: String,
    is_active: bool,
    send_fps: i32,
    send_width: i32,
    send_height: i32,
    jpeg_quality: i32,
    relay_agent_id: Option<Uuid>,
    rtsp_plaintext: Option<String>,
    rtsp_envelope: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PostgresStore {
    /// Connect, then apply embedded migrations before returning.
    ///
    /// # Errors
    /// - Connection, pool setup, or migration failures.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let store = Self::connect_without_migrations(pg).await?;
        sqlx::migrate!("./migrations").run(&store.pool).await?;
        Ok(store)
    }

    /// Connect without touching the schema.
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        // Avoid logging `pg.url`; it may contain credentials.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TrustStore for PostgresStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        let result = sqlx::query(
            r#"INSERT INTO users (id, email, password_hash, name, role, is_active, tenant_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.role)
        .bind(user.is_active)
        .bind(&user.tenant_id)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;
        if let Err(err) = result {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("email already registered".into()));
            }
            return Err(err.into());
        }
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<User> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_db)
            .ok_or_else(|| StoreError::NotFound("user".into()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_db))
    }

    async fn insert_refresh_credential(&self, credential: RefreshCredential) -> StoreResult<()> {
        let result = sqlx::query(
            r#"INSERT INTO refresh_credentials
               (id, secret_hash, user_id, expires_at, revoked_at, issued_ip, issued_user_agent, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(credential.id)
        .bind(&credential.secret_hash)
        .bind(credential.user_id)
        .bind(credential.expires_at)
        .bind(credential.revoked_at)
        .bind(&credential.issued_ip)
        .bind(&credential.issued_user_agent)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await;
        if let Err(err) = result {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("refresh credential exists".into()));
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn find_refresh_credential(
        &self,
        secret_hash: &str,
    ) -> StoreResult<Option<RefreshCredential>> {
        let row = sqlx::query_as::<_, DbRefreshCredential>(&format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_credentials WHERE secret_hash = $1"
        ))
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(refresh_from_db))
    }

    async fn revoke_refresh_credential(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_credentials SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM refresh_credentials WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound("refresh credential".into())),
        }
    }

    async fn insert_pair_code(&self, code: PairCode) -> StoreResult<PairCode> {
        let result = sqlx::query(
            r#"INSERT INTO pair_codes (code, tenant_id, agent_name, expires_at, created_at)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(&code.code)
        .bind(&code.tenant_id)
        .bind(&code.agent_name)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await;
        if let Err(err) = result {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("pair code exists".into()));
            }
            return Err(err.into());
        }
        Ok(code)
    }

    async fn redeem_pair_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
        enrollment: AgentEnrollment,
    ) -> StoreResult<RelayAgent> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DbPairCode>(
            r#"DELETE FROM pair_codes WHERE code = $1
               RETURNING code, tenant_id, agent_name, expires_at, created_at"#,
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound("pair code".into()));
        };
        let pair_code = pair_code_from_db(row);
        if pair_code.is_expired_at(now) {
            // Keep the expired row for later cleanup.
            tx.rollback().await?;
            return Err(StoreError::Expired("pair code".into()));
        }

        let agent = enrollment.bind(&pair_code);
        let result = sqlx::query(
            r#"INSERT INTO relay_agents
               (id, name, tenant_id, public_key_pem, refresh_secret_hash, is_active, last_seen_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(agent.id)
        .bind(&agent.name)
        .bind(&agent.tenant_id)
        .bind(&agent.public_key_pem)
        .bind(&agent.refresh_secret_hash)
        .bind(agent.is_active)
        .bind(agent.last_seen_at)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&mut *tx)
        .await;
        if let Err(err) = result {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("agent exists".into()));
            }
            return Err(err.into());
        }
        tx.commit().await?;
        Ok(agent)
    }

    async fn get_agent(&self, agent_id: Uuid) -> StoreResult<RelayAgent> {
        let row = sqlx::query_as::<_, DbRelayAgent>(&format!(
            "SELECT {AGENT_COLUMNS} FROM relay_agents WHERE id = $1"
        ))
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(agent_from_db)
            .ok_or_else(|| StoreError::NotFound("agent".into()))
    }

    async fn list_agents(&self, tenant_id: &str) -> StoreResult<Vec<RelayAgent>> {
        let rows = sqlx::query_as::<_, DbRelayAgent>(&format!(
            "SELECT {AGENT_COLUMNS} FROM relay_agents WHERE tenant_id = $1 ORDER BY created_at DESC"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(agent_from_db).collect())
    }

    async fn touch_agent(&self, agent_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE relay_agents SET last_seen_at = $2, updated_at = $2 WHERE id = $1")
                .bind(agent_id)
                .bind(at)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("agent".into()));
        }
        Ok(())
    }

    async fn set_agent_active(
        &self,
        agent_id: Uuid,
        is_active: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<RelayAgent> {
        let row = sqlx::query_as::<_, DbRelayAgent>(&format!(
            "UPDATE relay_agents SET is_active = $2, updated_at = $3 WHERE id = $1 RETURNING {AGENT_COLUMNS}"
        ))
        .bind(agent_id)
        .bind(is_active)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(agent_from_db)
            .ok_or_else(|| StoreError::NotFound("agent".into()))
    }

    async fn list_cameras(&self, tenant_id: &str) -> StoreResult<Vec<Camera>> {
        let rows = sqlx::query_as::<_, DbCamera>(&format!(
            "SELECT {CAMERA_COLUMNS} FROM cameras WHERE tenant_id = $1 ORDER BY name, id"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(camera_from_db).collect()
    }

    async fn list_agent_cameras(
        &self,
        tenant_id: &str,
        agent_id: Uuid,
    ) -> StoreResult<Vec<Camera>> {
        let rows = sqlx::query_as::<_, DbCamera>(&format!(
            "SELECT {CAMERA_COLUMNS} FROM cameras WHERE tenant_id = $1 AND relay_agent_id = $2 ORDER BY id"
        ))
        .bind(tenant_id)
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(camera_from_db).collect()
    }

    async fn get_camera(&self, tenant_id: &str, camera_id: &str) -> StoreResult<Camera> {
        let row = sqlx::query_as::<_, DbCamera>(&format!(
            "SELECT {CAMERA_COLUMNS} FROM cameras WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(camera_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => camera_from_db(row),
            None => Err(StoreError::NotFound("camera".into())),
        }
    }

    async fn create_camera(&self, camera: Camera) -> StoreResult<Camera> {
        let (relay_agent_id, rtsp_plaintext, envelope) = camera.credential.clone().into_parts();
        let rtsp_envelope = envelope.map(serde_json::to_value).transpose()?;
        let result = sqlx::query(
            r#"INSERT INTO cameras
               (tenant_id, id, name, is_active, send_fps, send_width, send_height, jpeg_quality,
                relay_agent_id, rtsp_plaintext, rtsp_envelope, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
        )
        .bind(&camera.tenant_id)
        .bind(&camera.id)
        .bind(&camera.name)
        .bind(camera.is_active)
        .bind(camera.stream.send_fps)
        .bind(camera.stream.send_width)
        .bind(camera.stream.send_height)
        .bind(camera.stream.jpeg_quality)
        .bind(relay_agent_id)
        .bind(rtsp_plaintext)
        .bind(rtsp_envelope)
        .bind(camera.created_at)
        .bind(camera.updated_at)
        .execute(&self.pool)
        .await;
        if let Err(err) = result {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("camera exists".into()));
            }
            return Err(err.into());
        }
        Ok(camera)
    }

    async fn update_camera(
        &self,
        tenant_id: &str,
        camera_id: &str,
        expected_updated_at: DateTime<Utc>,
        update: CameraUpdate,
    ) -> StoreResult<Camera> {
        let (relay_agent_id, rtsp_plaintext, envelope) = update.credential.into_parts();
        let rtsp_envelope = envelope.map(serde_json::to_value).transpose()?;
        let row = sqlx::query_as::<_, DbCamera>(&format!(
            r#"UPDATE cameras
               SET name = $3, is_active = $4, send_fps = $5, send_width = $6, send_height = $7,
                   jpeg_quality = $8, relay_agent_id = $9, rtsp_plaintext = $10,
                   rtsp_envelope = $11, updated_at = $12
               WHERE tenant_id = $1 AND id = $2 AND updated_at = $13
               RETURNING {CAMERA_COLUMNS}"#
        ))
        .bind(tenant_id)
        .bind(camera_id)
        .bind(&update.name)
        .bind(update.is_active)
        .bind(update.stream.send_fps)
        .bind(update.stream.send_width)
        .bind(update.stream.send_height)
        .bind(update.stream.jpeg_quality)
        .bind(relay_agent_id)
        .bind(rtsp_plaintext)
        .bind(rtsp_envelope)
        .bind(update.updated_at)
        .bind(expected_updated_at)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return camera_from_db(row);
        }
        let exists: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM cameras WHERE tenant_id = $1 AND id = $2")
                .bind(tenant_id)
                .bind(camera_id)
                .fetch_optional(&self.pool)
                .await?;
        match exists {
            Some(_) => Err(StoreError::Conflict("camera changed since read".into())),
            None => Err(StoreError::NotFound("camera".into())),
        }
    }

    async fn delete_camera(&self, tenant_id: &str, camera_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM cameras WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(camera_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("camera".into()));
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn user_from_db(row: DbUser) -> User {
    User {
        id: row.id,
        email: row.email,
        password_hash: row.password_hash,
        name: row.name,
        role: row.role,
        is_active: row.is_active,
        tenant_id: row.tenant_id,
        created_at: row.created_at,
    }
}

fn refresh_from_db(row: DbRefreshCredential) -> RefreshCredential {
    RefreshCredential {
        id: row.id,
        secret_hash: row.secret_hash,
        user_id: row.user_id,
        expires_at: row.expires_at,
        revoked_at: row.revoked_at,
        issued_ip: row.issued_ip,
        issued_user_agent: row.issued_user_agent,
        created_at: row.created_at,
    }
}

fn pair_code_from_db(row: DbPairCode) -> PairCode {
    PairCode {
        code: row.code,
        tenant_id: row.tenant_id,
        agent_name: row.agent_name,
        expires_at: row.expires_at,
        created_at: row.created_at,
    }
}

fn agent_from_db(row: DbRelayAgent) -> RelayAgent {
    RelayAgent {
        id: row.id,
        name: row.name,
        tenant_id: row.tenant_id,
        public_key_pem: row.public_key_pem,
        refresh_secret_hash: row.refresh_secret_hash,
        is_active: row.is_active,
        last_seen_at: row.last_seen_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn camera_from_db(row: DbCamera) -> StoreResult<Camera> {
    let envelope = row
        .rtsp_envelope
        .map(serde_json::from_value::<EnvelopeBundle>)
        .transpose()?;
    let credential = CameraCredential::from_parts(row.relay_agent_id, row.rtsp_plaintext, envelope)
        .ok_or_else(|| {
            StoreError::Unexpected(anyhow!(
                "camera {} has inconsistent credential columns",
                row.id
            ))
        })?;
    Ok(Camera {
        id: row.id,
        tenant_id: row.tenant_id,
        name: row.name,
        is_active: row.is_active,
        stream: StreamSettings {
            send_fps: row.send_fps,
            send_width: row.send_width,
            send_height: row.send_height,
            jpeg_quality: row.jpeg_quality,
        },
        credential,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
