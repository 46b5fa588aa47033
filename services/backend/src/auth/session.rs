//! Human session lifecycle: register, login, refresh, logout.
//!
//! # Purpose
//! Issues human-domain access tokens backed by server-side refresh
//! credentials. The refresh secret itself is only ever returned to the
//! client; the store keeps its SHA-256 digest.
//!
//! # Key invariants
//! - Unknown email, inactive user and wrong password are indistinguishable.
//! - An expired refresh credential is revoked the first time it is presented.
//! - Refresh secrets are not rotated on refresh.
use crate::auth::password::{PasswordError, hash_password, verify_password};
use crate::auth::token::{HumanClaims, HumanTokenCodec, TokenError};
use crate::model::{NewRefreshCredential, User};
use crate::store::{StoreError, TrustStore};
use chrono::{Duration, Utc};
use thiserror::Error;
use uuid::Uuid;
use vigil_crypto::{random_secret_hex, sha256_hex};

pub const USER_REFRESH_SECRET_BYTES: usize = 48;
pub const DEFAULT_ROLE: &str = "user";
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 72;
const NAME_MIN: usize = 2;
const NAME_MAX: usize = 60;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("email is already registered")]
    AlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("refresh token is not valid")]
    Unauthorized,
    #[error("refresh token expired")]
    Expired,
    #[error("user is disabled")]
    Forbidden,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub tenant_id: String,
}

/// Where a login came from; recorded on the refresh credential.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub expires_in: u64,
}

fn normalize_email(email: &str) -> Result<String, SessionError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(SessionError::Validation("email is not valid"));
    }
    Ok(email.to_string())
}

fn normalize_name(name: Option<&str>) -> Result<Option<String>, SessionError> {
    let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
        return Ok(None);
    };
    let len = name.chars().count();
    if len < NAME_MIN {
        return Err(SessionError::Validation("name must be at least 2 characters"));
    }
    if len > NAME_MAX {
        return Err(SessionError::Validation("name must be at most 60 characters"));
    }
    Ok(Some(name.to_string()))
}

pub async fn register(
    store: &(dyn TrustStore + Send + Sync),
    codec: &HumanTokenCodec,
    refresh_ttl: Duration,
    registration: Registration,
    client: ClientInfo,
) -> Result<IssuedSession, SessionError> {
    let email = normalize_email(&registration.email)?;
    let name = normalize_name(registration.name.as_deref())?;
    let password_len = registration.password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&password_len) {
        return Err(SessionError::Validation(
            "password must be between 8 and 72 characters",
        ));
    }
    let tenant_id = registration.tenant_id.trim();
    if tenant_id.is_empty() {
        return Err(SessionError::Validation("tenantId is required"));
    }
    if store.find_user_by_email(&email).await?.is_some() {
        return Err(SessionError::AlreadyExists);
    }

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(&registration.password)?,
        name,
        role: DEFAULT_ROLE.to_string(),
        is_active: true,
        tenant_id: tenant_id.to_string(),
        created_at: Utc::now(),
    };
    let user = match store.create_user(user).await {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => return Err(SessionError::AlreadyExists),
        Err(err) => return Err(err.into()),
    };
    tracing::info!(user_id = %user.id, tenant_id = %user.tenant_id, "user registered");
    open_session(store, codec, refresh_ttl, user, client).await
}

pub async fn login(
    store: &(dyn TrustStore + Send + Sync),
    codec: &HumanTokenCodec,
    refresh_ttl: Duration,
    email: &str,
    password: &str,
    client: ClientInfo,
) -> Result<IssuedSession, SessionError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(SessionError::Validation("email and password are required"));
    }
    let Some(user) = store.find_user_by_email(email).await? else {
        return Err(SessionError::InvalidCredentials);
    };
    if !user.is_active || !verify_password(password, &user.password_hash) {
        return Err(SessionError::InvalidCredentials);
    }
    open_session(store, codec, refresh_ttl, user, client).await
}

async fn open_session(
    store: &(dyn TrustStore + Send + Sync),
    codec: &HumanTokenCodec,
    refresh_ttl: Duration,
    user: User,
    client: ClientInfo,
) -> Result<IssuedSession, SessionError> {
    let now = Utc::now();
    let refresh_token = random_secret_hex(USER_REFRESH_SECRET_BYTES);
    let credential = NewRefreshCredential {
        secret_hash: sha256_hex(&refresh_token),
        user_id: user.id,
        expires_at: now + refresh_ttl,
        issued_ip: client.ip,
        issued_user_agent: client.user_agent,
    }
    .into_credential(now);
    store.insert_refresh_credential(credential).await?;

    let access_token = codec.sign(&claims_for(&user))?;
    metrics::counter!("vigil_user_sessions_total").increment(1);
    Ok(IssuedSession {
        user,
        access_token,
        refresh_token,
        expires_in: codec.ttl_seconds(),
    })
}

fn claims_for(user: &User) -> HumanClaims {
    HumanClaims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role.clone(),
        tid: user.tenant_id.clone(),
    }
}

pub async fn refresh(
    store: &(dyn TrustStore + Send + Sync),
    codec: &HumanTokenCodec,
    refresh_token: &str,
) -> Result<RefreshedAccess, SessionError> {
    let refresh_token = refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(SessionError::Unauthorized);
    }
    let Some(credential) = store
        .find_refresh_credential(&sha256_hex(refresh_token))
        .await?
    else {
        return Err(SessionError::Unauthorized);
    };
    if credential.is_revoked() {
        return Err(SessionError::Unauthorized);
    }
    let now = Utc::now();
    if credential.is_expired_at(now) {
        store.revoke_refresh_credential(credential.id, now).await?;
        return Err(SessionError::Expired);
    }
    let user = match store.get_user(credential.user_id).await {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => return Err(SessionError::Unauthorized),
        Err(err) => return Err(err.into()),
    };
    if !user.is_active {
        return Err(SessionError::Forbidden);
    }
    Ok(RefreshedAccess {
        access_token: codec.sign(&claims_for(&user))?,
        expires_in: codec.ttl_seconds(),
    })
}

/// Revoke the credential behind `refresh_token`. Unknown or already revoked
/// secrets are not an error.
pub async fn logout(
    store: &(dyn TrustStore + Send + Sync),
    refresh_token: &str,
) -> Result<(), SessionError> {
    let refresh_token = refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(SessionError::Validation("refreshToken is required"));
    }
    let credential = store
        .find_refresh_credential(&sha256_hex(refresh_token))
        .await?;
    match credential {
        Some(credential) if !credential.is_revoked() => {
            store
                .revoke_refresh_credential(credential.id, Utc::now())
                .await?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn codec() -> HumanTokenCodec {
        HumanTokenCodec::new(b"human-secret", 900, 0)
    }

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: "hunter2hunter2".to_string(),
            name: Some("Ada".to_string()),
            tenant_id: "T1".to_string(),
        }
    }

    async fn registered(store: &InMemoryStore) -> IssuedSession {
        register(
            store,
            &codec(),
            Duration::days(30),
            registration("ada@example.com"),
            ClientInfo::default(),
        )
        .await
        .expect("register")
    }

    #[tokio::test]
    async fn register_logs_the_user_in() {
        let store = InMemoryStore::new();
        let session = registered(&store).await;
        assert_eq!(session.user.role, "user");
        assert_eq!(session.refresh_token.len(), USER_REFRESH_SECRET_BYTES * 2);
        let claims = codec().verify(&session.access_token).expect("verify");
        assert_eq!(claims.sub, session.user.id);
        assert_eq!(claims.tid, "T1");
        assert!(session.user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryStore::new();
        registered(&store).await;
        let err = register(
            &store,
            &codec(),
            Duration::days(30),
            registration("ada@example.com"),
            ClientInfo::default(),
        )
        .await
        .expect_err("duplicate");
        assert!(matches!(err, SessionError::AlreadyExists));
    }

    #[tokio::test]
    async fn registration_input_is_validated() {
        let store = InMemoryStore::new();
        let mut short = registration("a@example.com");
        short.password = "short".to_string();
        let mut bad_name = registration("b@example.com");
        bad_name.name = Some("A".to_string());
        let bad_email = registration("not-an-email");
        let mut no_tenant = registration("c@example.com");
        no_tenant.tenant_id = "  ".to_string();

        for input in [short, bad_name, bad_email, no_tenant] {
            let err = register(
                &store,
                &codec(),
                Duration::days(30),
                input,
                ClientInfo::default(),
            )
            .await
            .expect_err("invalid");
            assert!(matches!(err, SessionError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn blank_name_is_treated_as_absent() {
        let store = InMemoryStore::new();
        let mut input = registration("d@example.com");
        input.name = Some("   ".to_string());
        let session = register(
            &store,
            &codec(),
            Duration::days(30),
            input,
            ClientInfo::default(),
        )
        .await
        .expect("register");
        assert!(session.user.name.is_none());
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let store = InMemoryStore::new();
        registered(&store).await;
        let unknown = login(
            &store,
            &codec(),
            Duration::days(30),
            "nobody@example.com",
            "hunter2hunter2",
            ClientInfo::default(),
        )
        .await
        .expect_err("unknown");
        let wrong = login(
            &store,
            &codec(),
            Duration::days(30),
            "ada@example.com",
            "wrong-password",
            ClientInfo::default(),
        )
        .await
        .expect_err("wrong");
        assert!(matches!(unknown, SessionError::InvalidCredentials));
        assert!(matches!(wrong, SessionError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn login_records_client_details() {
        let store = InMemoryStore::new();
        registered(&store).await;
        let session = login(
            &store,
            &codec(),
            Duration::days(30),
            " ada@example.com ",
            "hunter2hunter2",
            ClientInfo {
                ip: Some("10.0.0.7".to_string()),
                user_agent: Some("vigil-web".to_string()),
            },
        )
        .await
        .expect("login");
        let credential = store
            .find_refresh_credential(&sha256_hex(&session.refresh_token))
            .await
            .expect("lookup")
            .expect("credential");
        assert_eq!(credential.issued_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(credential.issued_user_agent.as_deref(), Some("vigil-web"));
    }

    #[tokio::test]
    async fn refresh_then_logout_then_refresh_fails() {
        let store = InMemoryStore::new();
        let session = registered(&store).await;
        let refreshed = refresh(&store, &codec(), &session.refresh_token)
            .await
            .expect("refresh");
        assert_eq!(
            codec().verify(&refreshed.access_token).expect("verify").sub,
            session.user.id
        );

        logout(&store, &session.refresh_token).await.expect("logout");
        logout(&store, &session.refresh_token)
            .await
            .expect("logout is idempotent");
        let err = refresh(&store, &codec(), &session.refresh_token)
            .await
            .expect_err("revoked");
        assert!(matches!(err, SessionError::Unauthorized));
    }

    #[tokio::test]
    async fn expired_refresh_credential_revokes_itself() {
        let store = InMemoryStore::new();
        let session = register(
            &store,
            &codec(),
            Duration::seconds(0),
            registration("e@example.com"),
            ClientInfo::default(),
        )
        .await
        .expect("register");
        let err = refresh(&store, &codec(), &session.refresh_token)
            .await
            .expect_err("expired");
        assert!(matches!(err, SessionError::Expired));
        let credential = store
            .find_refresh_credential(&sha256_hex(&session.refresh_token))
            .await
            .expect("lookup")
            .expect("credential");
        assert!(credential.is_revoked());
    }

    #[tokio::test]
    async fn unknown_refresh_secret_is_unauthorized() {
        let store = InMemoryStore::new();
        let err = refresh(&store, &codec(), "deadbeef")
            .await
            .expect_err("unknown");
        assert!(matches!(err, SessionError::Unauthorized));
    }
}
