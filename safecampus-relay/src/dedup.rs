//! Duplicate-submission guard
//!
//! Short-lived fingerprint cache that suppresses duplicate report
//! submissions inside a fixed window. Keyed by content (user, raw text,
//! coordinates), not by session, so identical submissions from different
//! devices collide too. Text is deliberately not normalized before
//! fingerprinting; varying whitespace defeats the guard, matching the
//! observed behavior of the deployed system.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Content-derived identity of a submission
///
/// Coordinates are fingerprinted by bit pattern so the key is hashable
/// without rounding surprises.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    user_id: String,
    description: String,
    lat_bits: u64,
    lng_bits: u64,
}

impl Fingerprint {
    pub fn new(user_id: &str, description: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            user_id: user_id.to_string(),
            description: description.to_string(),
            lat_bits: latitude.to_bits(),
            lng_bits: longitude.to_bits(),
        }
    }
}

/// TTL set of recently seen fingerprints
///
/// Check-then-insert holds one mutex, so concurrent submissions with an
/// identical fingerprint admit exactly one winner. Expired entries are
/// purged lazily on each check.
pub struct DedupGuard {
    window: Duration,
    seen: Mutex<HashMap<Fingerprint, Instant>>,
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when the fingerprint has not been seen inside the
    /// window, recording it; false means the submission is a duplicate.
    pub fn should_accept(&self, fingerprint: Fingerprint) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().expect("dedup lock poisoned");

        seen.retain(|_, inserted| now.duration_since(*inserted) < self.window);

        if seen.contains_key(&fingerprint) {
            debug!(user_id = %fingerprint.user_id, "duplicate submission suppressed");
            return false;
        }
        seen.insert(fingerprint, now);
        true
    }

    /// Number of live (unexpired) fingerprints, for diagnostics
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut seen = self.seen.lock().expect("dedup lock poisoned");
        seen.retain(|_, inserted| now.duration_since(*inserted) < self.window);
        seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::new("u-1", "suspicious person near the dorms", 3.1201, 101.6544)
    }

    #[tokio::test(start_paused = true)]
    async fn first_submission_wins_duplicate_rejected() {
        let guard = DedupGuard::new(Duration::from_secs(10));
        assert!(guard.should_accept(fp()));
        assert!(!guard.should_accept(fp()));
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fingerprint_expires_after_the_window() {
        let guard = DedupGuard::new(Duration::from_secs(10));
        assert!(guard.should_accept(fp()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(guard.should_accept(fp()));
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_inclusive_of_near_duplicates() {
        let guard = DedupGuard::new(Duration::from_secs(10));
        assert!(guard.should_accept(fp()));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!guard.should_accept(fp()));
    }

    #[tokio::test(start_paused = true)]
    async fn different_users_with_identical_content_still_collide_only_on_full_key() {
        let guard = DedupGuard::new(Duration::from_secs(10));
        let a = Fingerprint::new("u-1", "same text", 3.0, 101.0);
        let b = Fingerprint::new("u-2", "same text", 3.0, 101.0);
        // Distinct user ids produce distinct fingerprints
        assert!(guard.should_accept(a.clone()));
        assert!(guard.should_accept(b));
        assert!(!guard.should_accept(a));
    }

    #[tokio::test(start_paused = true)]
    async fn whitespace_variation_defeats_the_guard() {
        // Lenient by design: raw text is part of the key
        let guard = DedupGuard::new(Duration::from_secs(10));
        assert!(guard.should_accept(Fingerprint::new("u-1", "help here", 3.0, 101.0)));
        assert!(guard.should_accept(Fingerprint::new("u-1", "help  here", 3.0, 101.0)));
    }
}
