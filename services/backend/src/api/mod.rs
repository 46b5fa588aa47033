//! HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules, the shared error type, payload types and
//! the OpenAPI document.
pub mod agents;
pub mod auth;
pub mod cameras;
pub mod error;
pub mod openapi;
pub mod system;
pub mod types;
