//! Relay configuration
//!
//! Defaults live here; an optional TOML file overrides them, and the
//! command line (or environment, via clap) overrides the file for the
//! fields it carries.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Relay server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port the HTTP/SSE server listens on
    pub port: u16,
    /// SQLite database path
    pub db_path: String,
    /// Campus label stamped on reports that arrive without one
    pub campus: String,
    /// Minimum confidence for a new report to be broadcast to the dashboard
    pub publish_threshold: u8,
    /// Duplicate-submission suppression window, seconds
    pub dedup_window_secs: u64,
    /// Timeout for a deferred classifier invocation, seconds
    pub classifier_timeout_secs: u64,
    /// Re-score ambiguous middle-band reports asynchronously after intake
    pub deferred_rescore: bool,
    /// Verification code lifetime, seconds
    pub verification_code_ttl_secs: i64,
    /// Verification attempts allowed before lockout
    pub verification_max_attempts: i64,
    /// Event bus channel capacity
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: "safecampus.db".to_string(),
            campus: "University Malaya".to_string(),
            publish_threshold: 50,
            dedup_window_secs: 10,
            classifier_timeout_secs: 5,
            deferred_rescore: false,
            verification_code_ttl_secs: 10 * 60,
            verification_max_attempts: 3,
            event_capacity: 1000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }
}
