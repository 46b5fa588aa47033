//! Service configuration.
//!
//! # Purpose
//! Builds one `VigilConfig` at startup from environment variables, optionally
//! overlaid by a YAML file named in `VIGIL_CONFIG`, and validates it before any
//! component is constructed.
//!
//! # Security
//! Signing secrets are only read from the environment and are redacted from
//! `Debug` output. The Postgres URL is never logged.
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: u64 = 15 * 60;
pub const DEFAULT_AGENT_TOKEN_TTL_SECONDS: u64 = 12 * 60 * 60;
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 14;
pub const DEFAULT_TOKEN_LEEWAY_SECONDS: u64 = 30;
pub const DEFAULT_PAIR_CODE_TTL_SECONDS: i64 = 10 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

#[derive(Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .finish()
    }
}

/// Secrets and expiry policy for both token domains.
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl_seconds: u64,
    pub agent_secret: String,
    pub agent_ttl_seconds: u64,
    pub leeway_seconds: u64,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("agent_secret", &"<redacted>")
            .field("agent_ttl_seconds", &self.agent_ttl_seconds)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct VigilConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub tokens: TokenConfig,
    pub refresh_token_days: i64,
    pub pair_code_ttl_seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
struct VigilConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<String>,
    postgres_url: Option<String>,
    postgres_max_connections: Option<u32>,
    access_token_ttl_seconds: Option<u64>,
    agent_token_ttl_seconds: Option<u64>,
    refresh_token_days: Option<i64>,
    token_leeway_seconds: Option<u64>,
    pair_code_ttl_seconds: Option<i64>,
}

impl VigilConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Does not validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr: SocketAddr = parse_or(&lookup, "VIGIL_BIND", "0.0.0.0:4000".parse()?)?;
        let metrics_bind: SocketAddr =
            parse_or(&lookup, "VIGIL_METRICS_BIND", "0.0.0.0:9100".parse()?)?;
        let storage = parse_or(&lookup, "VIGIL_STORAGE", StorageBackend::Memory)?;
        let postgres = match lookup("VIGIL_POSTGRES_URL") {
            Some(url) => Some(PostgresConfig {
                url,
                max_connections: parse_or(&lookup, "VIGIL_POSTGRES_MAX_CONNECTIONS", 10)?,
                acquire_timeout_ms: parse_or(&lookup, "VIGIL_POSTGRES_ACQUIRE_TIMEOUT_MS", 5_000)?,
            }),
            None => None,
        };
        let tokens = TokenConfig {
            access_secret: lookup("ACCESS_TOKEN_SECRET").unwrap_or_default(),
            access_ttl_seconds: parse_or(
                &lookup,
                "ACCESS_TOKEN_TTL_SECONDS",
                DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            )?,
            agent_secret: lookup("AGENT_TOKEN_SECRET").unwrap_or_default(),
            agent_ttl_seconds: parse_or(
                &lookup,
                "AGENT_TOKEN_TTL_SECONDS",
                DEFAULT_AGENT_TOKEN_TTL_SECONDS,
            )?,
            leeway_seconds: parse_or(
                &lookup,
                "VIGIL_TOKEN_LEEWAY_SECONDS",
                DEFAULT_TOKEN_LEEWAY_SECONDS,
            )?,
        };
        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            tokens,
            refresh_token_days: parse_or(&lookup, "REFRESH_TOKEN_DAYS", DEFAULT_REFRESH_TOKEN_DAYS)?,
            pair_code_ttl_seconds: parse_or(
                &lookup,
                "VIGIL_PAIR_CODE_TTL_SECONDS",
                DEFAULT_PAIR_CODE_TTL_SECONDS,
            )?,
        })
    }

    /// Environment first, then the `VIGIL_CONFIG` overlay, then validation.
    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("VIGIL_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read VIGIL_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let overlay: VigilConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse vigil config yaml")?;
        if let Some(value) = overlay.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = overlay.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = overlay.storage {
            self.storage = value.parse()?;
        }
        if let Some(url) = overlay.postgres_url {
            let max_connections = self
                .postgres
                .as_ref()
                .map(|pg| pg.max_connections)
                .unwrap_or(10);
            let acquire_timeout_ms = self
                .postgres
                .as_ref()
                .map(|pg| pg.acquire_timeout_ms)
                .unwrap_or(5_000);
            self.postgres = Some(PostgresConfig {
                url,
                max_connections,
                acquire_timeout_ms,
            });
        }
        if let (Some(value), Some(pg)) = (overlay.postgres_max_connections, self.postgres.as_mut())
        {
            pg.max_connections = value;
        }
        if let Some(value) = overlay.access_token_ttl_seconds {
            self.tokens.access_ttl_seconds = value;
        }
        if let Some(value) = overlay.agent_token_ttl_seconds {
            self.tokens.agent_ttl_seconds = value;
        }
        if let Some(value) = overlay.token_leeway_seconds {
            self.tokens.leeway_seconds = value;
        }
        if let Some(value) = overlay.refresh_token_days {
            self.refresh_token_days = value;
        }
        if let Some(value) = overlay.pair_code_ttl_seconds {
            self.pair_code_ttl_seconds = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tokens.access_secret.is_empty() {
            bail!("ACCESS_TOKEN_SECRET must be set");
        }
        if self.tokens.agent_secret.is_empty() {
            bail!("AGENT_TOKEN_SECRET must be set");
        }
        if self.tokens.access_secret == self.tokens.agent_secret {
            bail!("ACCESS_TOKEN_SECRET and AGENT_TOKEN_SECRET must differ");
        }
        if self.tokens.access_ttl_seconds == 0 || self.tokens.agent_ttl_seconds == 0 {
            bail!("token TTLs must be positive");
        }
        if self.refresh_token_days <= 0 {
            bail!("REFRESH_TOKEN_DAYS must be positive");
        }
        if self.pair_code_ttl_seconds <= 0 {
            bail!("VIGIL_PAIR_CODE_TTL_SECONDS must be positive");
        }
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("VIGIL_POSTGRES_URL is required for postgres storage");
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| -> anyhow::Error { err.into() })
            .with_context(|| format!("parse {key}")),
        None => Ok(default),
    }
}
