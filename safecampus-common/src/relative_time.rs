//! Presence and last-seen rendering
//!
//! Provides consistent relative-time display across the relay: a user is
//! shown as online while their last activity falls inside a short recency
//! window, and otherwise gets a bucketed "Nm/Nh/Nd ago" label.

use chrono::{DateTime, Utc};

/// Recency window for the online flag (seconds)
pub const ONLINE_WINDOW_SECS: i64 = 5 * 60;

/// True when `last_activity` falls within the online window before `now`
pub fn is_recent(last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let elapsed = now.signed_duration_since(last_activity).num_seconds();
    (0..=ONLINE_WINDOW_SECS).contains(&elapsed)
}

/// Render a last-seen timestamp as a relative-time label
///
/// Buckets: under a minute → "Just now"; under an hour → minutes; under a
/// day → hours; otherwise days.
pub fn last_seen_label(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(last_seen).num_seconds().max(0);

    if elapsed < 60 {
        "Just now".to_string()
    } else if elapsed < 3600 {
        format!("{}m ago", elapsed / 60)
    } else if elapsed < 86_400 {
        format!("{}h ago", elapsed / 3600)
    } else {
        format!("{}d ago", elapsed / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn just_now_bucket() {
        let now = Utc::now();
        assert_eq!(last_seen_label(now, now), "Just now");
        assert_eq!(last_seen_label(now - Duration::seconds(59), now), "Just now");
    }

    #[test]
    fn minute_bucket() {
        let now = Utc::now();
        assert_eq!(last_seen_label(now - Duration::seconds(60), now), "1m ago");
        assert_eq!(last_seen_label(now - Duration::minutes(59), now), "59m ago");
    }

    #[test]
    fn hour_bucket() {
        let now = Utc::now();
        assert_eq!(last_seen_label(now - Duration::hours(1), now), "1h ago");
        assert_eq!(last_seen_label(now - Duration::hours(23), now), "23h ago");
    }

    #[test]
    fn day_bucket() {
        let now = Utc::now();
        assert_eq!(last_seen_label(now - Duration::days(1), now), "1d ago");
        assert_eq!(last_seen_label(now - Duration::days(14), now), "14d ago");
    }

    #[test]
    fn future_timestamps_clamp_to_just_now() {
        let now = Utc::now();
        assert_eq!(last_seen_label(now + Duration::minutes(5), now), "Just now");
    }

    #[test]
    fn online_window() {
        let now = Utc::now();
        assert!(is_recent(now - Duration::minutes(4), now));
        assert!(!is_recent(now - Duration::minutes(6), now));
    }
}
