//! Authentication and trust establishment.
//!
//! # Purpose
//! Groups the two-domain token codec, request identity extractors, password
//! hashing, human sessions, the pairing protocol, and agent sessions.
pub mod agent_session;
pub mod context;
pub mod pairing;
pub mod password;
pub mod session;
pub mod token;
