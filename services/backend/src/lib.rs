//! Vigil backend library crate.
//!
//! # Purpose
//! Exposes the trust and credential-relay API surface, auth components,
//! configuration, and storage implementations for use by the binary and tests.
//!
//! # Notes
//! `auth` owns tokens, pairing and sessions; `relay` owns camera credential
//! storage; `store` is the only module that touches persistence.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod model;
pub mod observability;
pub mod relay;
pub mod store;
