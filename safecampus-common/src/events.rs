//! Event types for the SafeCampus live channel
//!
//! Provides the shared `RelayEvent` definitions and the audience-routed
//! `EventBus` used to fan events out to connected dashboard and mobile
//! clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::model::{FeedbackVote, Message, Report, ReportStatus, Role, SosEvent};

/// Name of the logical room all security dashboard connections join
pub const DASHBOARD_ROOM: &str = "security_dashboard";

/// Name of a user's personal room
pub fn user_room(user_id: &str) -> String {
    format!("user_{}", user_id)
}

/// Who an envelope is addressed to
///
/// Each live connection filters the shared broadcast stream against its own
/// registration, so audience routing happens at the subscriber edge rather
/// than with per-room channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every live connection
    All,
    /// Every connection registered with the given role
    Role(Role),
    /// The connections of one specific user
    User(String),
}

/// An event stamped with a unique id and an audience
///
/// Delivery is at-least-once: a consumer may see the same logical update
/// through more than one envelope and must deduplicate on `id`.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: Uuid,
    pub audience: Audience,
    pub event: RelayEvent,
}

/// SafeCampus live events
///
/// The serde tag doubles as the wire event name, so variant names here are
/// load-bearing: dashboards and mobile clients subscribe by these strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// New or re-scored report, full record projection
    ReportUpdate { report: Report },

    /// A report's status changed (dashboard action or feedback upgrade)
    ReportStatusUpdated {
        report_id: Uuid,
        status: ReportStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        resolved_by: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        resolved_at: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },

    /// One-shot snapshot sent to a dashboard connection when it joins
    InitialReports { reports: Vec<Report>, count: usize },

    /// SOS raised, peer-device copy
    FriendSosAlert { sos: SosEvent },

    /// SOS raised, dashboard copy (same payload as the peer copy)
    SecuritySosAlert { sos: SosEvent },

    /// SOS location update, peer-device copy
    FriendLocationUpdate {
        sos_id: Uuid,
        user_id: String,
        user_name: String,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    },

    /// SOS location update, dashboard copy
    SosLocationUpdate {
        sos_id: Uuid,
        user_id: String,
        user_name: String,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    },

    /// A friend acknowledged an SOS; sent to the originator only
    SosAcknowledged {
        sos_id: Uuid,
        friend_id: String,
        friend_name: String,
        timestamp: DateTime<Utc>,
    },

    /// The originating user ended an SOS
    FriendSosEnded {
        sos_id: Uuid,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Direct chat message; sent to the recipient's personal room only
    NewMessage { message: Message },

    /// Ask nearby peers to confirm whether a published report looks real
    FeedbackRequest {
        report_id: Uuid,
        report_text: String,
        timestamp: DateTime<Utc>,
    },

    /// A feedback vote was recorded
    FeedbackResponse {
        report_id: Uuid,
        vote: FeedbackVote,
        #[serde(skip_serializing_if = "Option::is_none")]
        voter_id: Option<String>,
        confirmed_real: bool,
        timestamp: DateTime<Utc>,
    },

    /// Connected-client counts changed
    ConnectionUpdate {
        mobile: usize,
        dashboard: usize,
        timestamp: DateTime<Utc>,
    },
}

impl RelayEvent {
    /// Wire event name, identical to the serde tag
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::ReportUpdate { .. } => "report_update",
            RelayEvent::ReportStatusUpdated { .. } => "report_status_updated",
            RelayEvent::InitialReports { .. } => "initial_reports",
            RelayEvent::FriendSosAlert { .. } => "friend_sos_alert",
            RelayEvent::SecuritySosAlert { .. } => "security_sos_alert",
            RelayEvent::FriendLocationUpdate { .. } => "friend_location_update",
            RelayEvent::SosLocationUpdate { .. } => "sos_location_update",
            RelayEvent::SosAcknowledged { .. } => "sos_acknowledged",
            RelayEvent::FriendSosEnded { .. } => "friend_sos_ended",
            RelayEvent::NewMessage { .. } => "new_message",
            RelayEvent::FeedbackRequest { .. } => "feedback_request",
            RelayEvent::FeedbackResponse { .. } => "feedback_response",
            RelayEvent::ConnectionUpdate { .. } => "connection_update",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future envelopes
    ///
    /// Envelopes emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Emit an event to the given audience, returning the envelope id
    ///
    /// Having no subscribers is not an error; the envelope is simply
    /// dropped. Delivery failures never propagate to the caller.
    pub fn emit(&self, audience: Audience, event: RelayEvent) -> Uuid {
        let id = Uuid::new_v4();
        debug!(
            event = event.name(),
            envelope_id = %id,
            audience = ?audience,
            "emitting relay event"
        );
        let _ = self.tx.send(Envelope { id, audience, event });
        id
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, SosStatus};

    fn sample_sos() -> SosEvent {
        SosEvent {
            id: Uuid::new_v4(),
            user_id: "u-1".into(),
            user_name: "Aisyah".into(),
            location: Location {
                latitude: 3.1201,
                longitude: 101.6544,
                address: None,
                campus: None,
            },
            message: Some("help".into()),
            status: SosStatus::Active,
            acknowledgments: Vec::new(),
            raised_at: Utc::now(),
        }
    }

    #[test]
    fn wire_names_match_serde_tag() {
        let event = RelayEvent::FriendSosAlert { sos: sample_sos() };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.name());

        let event = RelayEvent::ConnectionUpdate {
            mobile: 2,
            dashboard: 1,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "connection_update");
    }

    #[tokio::test]
    async fn bus_delivers_to_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let id = bus.emit(Audience::All, RelayEvent::FriendSosAlert { sos: sample_sos() });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.audience, Audience::All);
        assert_eq!(envelope.event.name(), "friend_sos_alert");
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(16);
        bus.emit(
            Audience::Role(Role::Dashboard),
            RelayEvent::ConnectionUpdate {
                mobile: 0,
                dashboard: 0,
                timestamp: Utc::now(),
            },
        );
        assert_eq!(bus.subscriber_count(), 0);
    }
}
