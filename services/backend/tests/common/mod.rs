#![allow(dead_code)]

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;
use vigil_backend::app::{AppState, build_router};
use vigil_backend::auth::token::{AgentTokenCodec, HumanClaims, HumanTokenCodec};
use vigil_backend::store::memory::InMemoryStore;

pub const AGENT_A_PUBLIC: &str = include_str!("../fixtures/agent_a.pub.pem");
pub const AGENT_A_PRIVATE: &str = include_str!("../fixtures/agent_a.key.pem");
pub const AGENT_B_PUBLIC: &str = include_str!("../fixtures/agent_b.pub.pem");
pub const AGENT_B_PRIVATE: &str = include_str!("../fixtures/agent_b.key.pem");

pub type TestApp = axum::routing::RouterIntoService<axum::body::Body, ()>;

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn test_state() -> AppState {
    AppState {
        store: Arc::new(InMemoryStore::new()),
        human_tokens: Arc::new(HumanTokenCodec::new(b"test-human-secret", 900, 0)),
        agent_tokens: Arc::new(AgentTokenCodec::new(b"test-agent-secret", 43_200, 0)),
        pair_code_ttl: chrono::Duration::seconds(600),
        refresh_ttl: chrono::Duration::days(14),
    }
}

pub fn test_app() -> (TestApp, AppState) {
    let state = test_state();
    (build_router(state.clone()).into_service(), state)
}

/// Human access token for an admin of `tenant_id`.
pub fn tenant_token(state: &AppState, tenant_id: &str) -> String {
    state
        .human_tokens
        .sign(&HumanClaims {
            sub: Uuid::new_v4(),
            email: "admin@example.com".to_string(),
            role: "admin".to_string(),
            tid: tenant_id.to_string(),
        })
        .expect("sign human token")
}

/// Unseal an agent feed's `rtspUrlEnc` the way a relay agent does and return
/// the RTSP URL.
pub fn open_envelope(private_pem: &str, rtsp_url_enc: &serde_json::Value) -> Result<String, String> {
    let encoded = rtsp_url_enc
        .as_str()
        .ok_or("rtspUrlEnc is not a string")?;
    let envelope: serde_json::Value =
        serde_json::from_str(encoded).map_err(|err| err.to_string())?;
    let field = |name: &str| -> Result<Vec<u8>, String> {
        let raw = envelope[name].as_str().ok_or(format!("missing {name}"))?;
        STANDARD.decode(raw).map_err(|err| err.to_string())
    };
    let private = RsaPrivateKey::from_pkcs8_pem(private_pem).map_err(|err| err.to_string())?;
    let key = private
        .decrypt(Oaep::new::<Sha256>(), &field("encKey")?)
        .map_err(|err| err.to_string())?;
    let nonce = field("iv")?;
    let mut body = field("ciphertext")?;
    body.extend(field("tag")?);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|err| err.to_string())?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), body.as_slice())
        .map_err(|_| "aead open failed".to_string())?;
    let payload: serde_json::Value =
        serde_json::from_slice(&plaintext).map_err(|err| err.to_string())?;
    payload["rtspUrl"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| "missing rtspUrl".to_string())
}
