//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction to keep error shapes uniform
//! across endpoints, and maps each domain error onto a status and code.
//!
//! # Key invariants and assumptions
//! - Error responses must include a stable `code` and human-readable `message`.
//! - Status codes must align with the error category.
//!
//! # Security considerations
//! - Internal errors log details server-side but return generic messages.
//! - Token and credential failures never say which check failed.
use crate::api::types::ErrorResponse;
use crate::auth::agent_session::AgentSessionError;
use crate::auth::context::ContextError;
use crate::auth::pairing::PairingError;
use crate::auth::session::SessionError;
use crate::relay::CredentialError;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Invariants
/// - `status` must match the semantics of `body.code`.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use vigil_backend::api::error::ApiError;
/// use vigil_backend::api::types::ErrorResponse;
///
/// let err = ApiError {
///     status: StatusCode::NOT_FOUND,
///     body: ErrorResponse {
///         code: "not_found".to_string(),
///         message: "missing".to_string(),
///         request_id: None,
///     },
/// };
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Build a 409 Conflict error with a caller-provided conflict code.
pub fn api_conflict(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, code, message)
}

/// Build a 410 Gone error for an artifact whose validity window has closed.
pub fn api_gone(message: &str) -> ApiError {
    api_error(StatusCode::GONE, "expired", message)
}

/// Build a 500 Internal Server Error from a store error.
///
/// # What it does
/// Logs the store error and returns a generic internal error response.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "vigil storage error");
    api_internal_message(message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

/// Build a 401 for a presented secret that did not match.
pub fn api_invalid_credential(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "invalid_credential", message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn api_tenant_required(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "tenant_required", message)
}

pub fn api_invalid_recipient_key(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "invalid_recipient_key", message)
}

/// Build a 422 for a relay change that needs the plaintext RTSP URL resubmitted.
pub fn api_missing_plaintext(message: &str) -> ApiError {
    api_error(StatusCode::UNPROCESSABLE_ENTITY, "missing_plaintext", message)
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::TenantRequired => {
                api_tenant_required("bearer token or x-tenant-id header required")
            }
            ContextError::MissingBearer => api_unauthorized("missing bearer token"),
            ContextError::InvalidToken(err) => {
                tracing::debug!(error = %err, "bearer token rejected");
                api_unauthorized("invalid or expired token")
            }
            ContextError::Forbidden => api_forbidden("token does not address this agent"),
        }
    }
}

impl From<PairingError> for ApiError {
    fn from(err: PairingError) -> Self {
        match err {
            PairingError::Validation(message) => api_validation_error(message),
            PairingError::NotFound => api_not_found("pair code not found"),
            PairingError::Expired => api_gone("pair code expired"),
            PairingError::InvalidRecipientKey => {
                api_invalid_recipient_key("publicKeyPem is not a usable RSA public key")
            }
            PairingError::Store(err) => api_internal("pairing failed", &err),
        }
    }
}

impl From<AgentSessionError> for ApiError {
    fn from(err: AgentSessionError) -> Self {
        match err {
            AgentSessionError::NotFound => api_not_found("agent not found"),
            AgentSessionError::InvalidCredential => api_invalid_credential("invalid agent credential"),
            AgentSessionError::Forbidden => api_forbidden("agent is not permitted"),
            AgentSessionError::Token(err) => {
                tracing::error!(error = %err, "agent token signing failed");
                api_internal_message("token issuance failed")
            }
            AgentSessionError::Store(err) => api_internal("agent session failed", &err),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Validation(message) => api_validation_error(message),
            SessionError::AlreadyExists => api_conflict("already_exists", "email already registered"),
            SessionError::InvalidCredentials => api_invalid_credential("invalid credentials"),
            SessionError::Unauthorized | SessionError::Expired => {
                api_unauthorized("refresh token is not valid")
            }
            SessionError::Forbidden => api_forbidden("user is disabled"),
            SessionError::Password(err) => {
                tracing::error!(error = %err, "password hashing failed");
                api_internal_message("registration failed")
            }
            SessionError::Token(err) => {
                tracing::error!(error = %err, "access token signing failed");
                api_internal_message("token issuance failed")
            }
            SessionError::Store(err) => api_internal("session operation failed", &err),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Validation(message) => api_validation_error(message),
            CredentialError::MissingPlaintextForReencryption => {
                api_missing_plaintext("rtspUrl is required when the relay target changes")
            }
            CredentialError::CameraNotFound => api_not_found("camera not found"),
            CredentialError::AgentNotFound => api_not_found("relay agent not found"),
            CredentialError::AgentInactive => api_validation_error("relay agent is deactivated"),
            CredentialError::ConcurrentUpdate => {
                api_conflict("conflict", "camera was modified concurrently; retry")
            }
            CredentialError::AlreadyExists => api_conflict("already_exists", "camera already exists"),
            CredentialError::InvalidRecipientKey => {
                tracing::error!("stored relay agent public key does not parse");
                api_internal_message("camera credential could not be sealed")
            }
            CredentialError::Seal(err) => {
                tracing::error!(error = %err, "camera credential sealing failed");
                api_internal_message("camera credential could not be sealed")
            }
            CredentialError::Store(err) => api_internal("camera operation failed", &err),
        }
    }
}
