//! # SafeCampus Common Library
//!
//! Shared code for the SafeCampus relay services including:
//! - Canonical domain model (reports, SOS events, enumerations)
//! - Event types (RelayEvent enum) and the audience-routed EventBus
//! - Presence/relative-time rendering
//! - Common error types

pub mod error;
pub mod events;
pub mod model;
pub mod relative_time;

pub use error::{Error, Result};
