//! Broadcast router
//!
//! Owns the event → audience routing table: for each lifecycle event it
//! decides which rooms/connections receive it and emits accordingly. SOS
//! raise and location events are deliberately dual-emitted (peer copy to
//! everyone, dashboard copy to the security room); delivery is therefore
//! at-least-once and consumers deduplicate on envelope id.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use safecampus_common::events::{Audience, EventBus, RelayEvent};
use safecampus_common::model::{FeedbackVote, Message, Report, ReportStatus, Role, SosEvent};

/// Routes lifecycle events to their audiences
#[derive(Clone)]
pub struct BroadcastRouter {
    bus: EventBus,
}

impl BroadcastRouter {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    // ------------------------------------------------------------------
    // Generic emit primitives
    // ------------------------------------------------------------------

    pub fn emit_to_role(&self, role: Role, event: RelayEvent) -> Uuid {
        self.bus.emit(Audience::Role(role), event)
    }

    pub fn emit_to_user(&self, user_id: &str, event: RelayEvent) -> Uuid {
        self.bus.emit(Audience::User(user_id.to_string()), event)
    }

    pub fn emit_to_all(&self, event: RelayEvent) -> Uuid {
        self.bus.emit(Audience::All, event)
    }

    // ------------------------------------------------------------------
    // Routing table
    // ------------------------------------------------------------------

    /// New report accepted and above the publish threshold → dashboard
    pub fn report_published(&self, report: &Report) {
        self.emit_to_role(
            Role::Dashboard,
            RelayEvent::ReportUpdate {
                report: report.clone(),
            },
        );
    }

    /// Report status changed → dashboard
    pub fn report_status_updated(&self, report: &Report) {
        self.emit_to_role(
            Role::Dashboard,
            RelayEvent::ReportStatusUpdated {
                report_id: report.id,
                status: report.status,
                resolved_by: report.resolved_by.clone(),
                resolved_at: report.resolved_at,
                timestamp: Utc::now(),
            },
        );
    }

    /// SOS raised → all peers AND the dashboard (same payload twice)
    pub fn sos_raised(&self, sos: &SosEvent) {
        let peer_id = self.emit_to_all(RelayEvent::FriendSosAlert { sos: sos.clone() });
        let dash_id = self.emit_to_role(
            Role::Dashboard,
            RelayEvent::SecuritySosAlert { sos: sos.clone() },
        );
        info!(
            sos_id = %sos.id,
            peer_envelope = %peer_id,
            dashboard_envelope = %dash_id,
            "SOS dual-emitted to peers and dashboard"
        );
    }

    /// SOS location update → all peers AND the dashboard
    pub fn sos_location_updated(&self, sos: &SosEvent) {
        let timestamp = Utc::now();
        self.emit_to_all(RelayEvent::FriendLocationUpdate {
            sos_id: sos.id,
            user_id: sos.user_id.clone(),
            user_name: sos.user_name.clone(),
            latitude: sos.location.latitude,
            longitude: sos.location.longitude,
            timestamp,
        });
        self.emit_to_role(
            Role::Dashboard,
            RelayEvent::SosLocationUpdate {
                sos_id: sos.id,
                user_id: sos.user_id.clone(),
                user_name: sos.user_name.clone(),
                latitude: sos.location.latitude,
                longitude: sos.location.longitude,
                timestamp,
            },
        );
        debug!(sos_id = %sos.id, "SOS location dual-emitted");
    }

    /// SOS acknowledged → the originating user's connections only
    pub fn sos_acknowledged(&self, sos: &SosEvent, friend_id: &str, friend_name: &str) {
        self.emit_to_user(
            &sos.user_id,
            RelayEvent::SosAcknowledged {
                sos_id: sos.id,
                friend_id: friend_id.to_string(),
                friend_name: friend_name.to_string(),
                timestamp: Utc::now(),
            },
        );
    }

    /// SOS ended → all connections
    pub fn sos_ended(&self, sos: &SosEvent) {
        self.emit_to_all(RelayEvent::FriendSosEnded {
            sos_id: sos.id,
            user_id: sos.user_id.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Direct chat message → the recipient's personal room only
    pub fn message_sent(&self, message: &Message) {
        self.emit_to_user(
            &message.recipient_id,
            RelayEvent::NewMessage {
                message: message.clone(),
            },
        );
    }

    /// Published report → ask peers to confirm authenticity
    pub fn feedback_requested(&self, report: &Report) {
        self.emit_to_all(RelayEvent::FeedbackRequest {
            report_id: report.id,
            report_text: report.description.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Feedback vote recorded → dashboard
    pub fn feedback_recorded(
        &self,
        report_id: Uuid,
        vote: FeedbackVote,
        voter_id: Option<String>,
        confirmed_real: bool,
    ) {
        self.emit_to_role(
            Role::Dashboard,
            RelayEvent::FeedbackResponse {
                report_id,
                vote,
                voter_id,
                confirmed_real,
                timestamp: Utc::now(),
            },
        );
    }

    /// Connected-client counts changed → everyone
    pub fn connection_counts(&self, mobile: usize, dashboard: usize) {
        self.emit_to_all(RelayEvent::ConnectionUpdate {
            mobile,
            dashboard,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safecampus_common::model::{Location, SosStatus};

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
            message: None,
            status: SosStatus::Active,
            acknowledgments: Vec::new(),
            raised_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sos_raise_is_dual_emitted() {
        let bus = EventBus::new(16);
        let router = BroadcastRouter::new(bus.clone());
        let mut rx = bus.subscribe();

        router.sos_raised(&sample_sos());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.audience, Audience::All);
        assert_eq!(first.event.name(), "friend_sos_alert");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.audience, Audience::Role(Role::Dashboard));
        assert_eq!(second.event.name(), "security_sos_alert");

        // Idempotency handles the overlap: the two envelopes are distinct
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn acknowledgment_goes_to_the_originator_only() {
        let bus = EventBus::new(16);
        let router = BroadcastRouter::new(bus.clone());
        let mut rx = bus.subscribe();

        router.sos_acknowledged(&sample_sos(), "f-1", "Mei");

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.audience, Audience::User("u-1".into()));
        assert_eq!(envelope.event.name(), "sos_acknowledged");
    }

    #[tokio::test]
    async fn chat_message_goes_to_the_recipient_room() {
        let bus = EventBus::new(16);
        let router = BroadcastRouter::new(bus.clone());
        let mut rx = bus.subscribe();

        let message = Message {
            id: Uuid::new_v4(),
            sender_id: "u-1".into(),
            sender_name: "Aisyah".into(),
            recipient_id: "u-2".into(),
            body: "walking back now".into(),
            message_type: safecampus_common::model::MessageType::Text,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };
        router.message_sent(&message);

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.audience, Audience::User("u-2".into()));
        assert_eq!(envelope.event.name(), "new_message");
    }
}
