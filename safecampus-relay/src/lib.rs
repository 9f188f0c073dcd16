//! # SafeCampus Relay (safecampus-relay)
//!
//! Campus-safety incident-reporting and real-time alert relay.
//!
//! **Purpose:** Take report and SOS submissions from mobile clients,
//! deduplicate and score them, persist and cache the records, and fan live
//! updates out to the security dashboard and peer devices over SSE.
//!
//! **Architecture:** axum HTTP/SSE server over a tokio broadcast bus, with
//! SQLite (sqlx) persistence and in-memory caches for the live working set.

pub mod api;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod router;
pub mod scoring;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
