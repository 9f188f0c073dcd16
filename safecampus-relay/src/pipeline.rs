//! Alert/SOS lifecycle controller
//!
//! Orchestrates report intake (dedup → score → persist → cache →
//! broadcast) and the SOS lifecycle (raise → acknowledge* → end). Reports
//! go through the store; SOS events live entirely in the in-memory cache.
//!
//! Broadcast happens only after a successful commit and never fails the
//! submitter-facing response: emission errors are logged and swallowed by
//! the router. Events for a given report are emitted in the order their
//! transitions committed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use safecampus_common::model::{
    Category, FeedbackVote, Location, Message, MessageType, Report, ReportStatus, SosAck,
    SosEvent, SosStatus,
};

use crate::config::Config;
use crate::db;
use crate::dedup::{DedupGuard, Fingerprint};
use crate::error::{Error, Result};
use crate::router::BroadcastRouter;
use crate::scoring::{self, Classifier, HIGH_TIER_MIN, MEDIUM_TIER_MIN};
use crate::state::SharedState;

/// Client-supplied fields of a report submission
///
/// Everything else (id, score, classification, timestamps) is assigned
/// server-side.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewReport {
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub user_phone: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub campus: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub evidence_images: Vec<String>,
}

/// Client-supplied fields of an SOS raise
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SosRequest {
    pub user_id: String,
    pub user_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client-supplied fields of a direct message
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SendMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    pub body: String,
    #[serde(default)]
    pub message_type: Option<String>,
}

/// Result of report intake: accepted, or suppressed as a duplicate
///
/// Duplicate is a distinguished non-error outcome so the submitter can be
/// told apart from a genuine failure.
#[derive(Debug, Clone)]
pub enum IntakeOutcome {
    Accepted(Report),
    Duplicate,
}

/// The lifecycle controller
///
/// Sole mutator of the shared caches; handlers never touch them directly.
pub struct AlertPipeline {
    db: Pool<Sqlite>,
    state: Arc<SharedState>,
    router: BroadcastRouter,
    dedup: DedupGuard,
    /// Secondary classifier for deferred re-scores of ambiguous reports;
    /// None disables the deferred path entirely
    reclassifier: Option<Arc<dyn Classifier>>,
    publish_threshold: u8,
    classifier_timeout: Duration,
    default_campus: String,
}

impl AlertPipeline {
    pub fn new(
        db: Pool<Sqlite>,
        state: Arc<SharedState>,
        router: BroadcastRouter,
        config: &Config,
        reclassifier: Option<Arc<dyn Classifier>>,
    ) -> Self {
        Self {
            db,
            state,
            router,
            dedup: DedupGuard::new(Duration::from_secs(config.dedup_window_secs)),
            reclassifier,
            publish_threshold: config.publish_threshold,
            classifier_timeout: Duration::from_secs(config.classifier_timeout_secs),
            default_campus: config.campus.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Report lifecycle
    // ------------------------------------------------------------------

    /// Intake a new report: dedup → score → persist → cache → broadcast
    ///
    /// A persistence failure surfaces synchronously; broadcast runs only
    /// after the commit and cannot fail the submitter's response.
    pub async fn submit_report(&self, new: NewReport) -> Result<IntakeOutcome> {
        validate_identity(&new.user_id, &new.user_name)?;
        validate_coordinates(new.latitude, new.longitude)?;

        let description = new.description.unwrap_or_default();
        let fingerprint =
            Fingerprint::new(&new.user_id, &description, new.latitude, new.longitude);
        if !self.dedup.should_accept(fingerprint) {
            return Ok(IntakeOutcome::Duplicate);
        }

        let category = new
            .category
            .as_deref()
            .map(Category::parse_lenient)
            .unwrap_or_default();
        let scored = scoring::score(&description, new.evidence_images.len(), category);

        let now = Utc::now();
        let report = Report {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            user_name: new.user_name,
            user_phone: new.user_phone,
            description,
            location: Location {
                latitude: new.latitude,
                longitude: new.longitude,
                address: new.address,
                campus: new.campus.or_else(|| Some(self.default_campus.clone())),
            },
            category,
            evidence_images: new.evidence_images,
            confidence: scored.confidence,
            status: scored.status,
            priority: scored.priority,
            verification_tag: scored.verification_tag,
            explanation: scored.explanation,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };

        db::reports::create(&self.db, &report).await?;
        self.state.cache_report(report.clone()).await;

        if report.confidence >= self.publish_threshold {
            self.router.report_published(&report);
            self.router.feedback_requested(&report);
            info!(
                report_id = %report.id,
                confidence = report.confidence,
                priority = %report.priority,
                "report accepted and published"
            );
        } else {
            info!(
                report_id = %report.id,
                confidence = report.confidence,
                "report accepted but suppressed below publish threshold"
            );
        }

        if let Some(classifier) = &self.reclassifier {
            if (MEDIUM_TIER_MIN..HIGH_TIER_MIN).contains(&report.confidence) {
                self.spawn_deferred_rescore(report.clone(), Arc::clone(classifier));
            }
        }

        Ok(IntakeOutcome::Accepted(report))
    }

    /// Fire-and-forget re-score of an ambiguous report
    ///
    /// The submitter's response has already been sent; whatever happens
    /// here surfaces only as a follow-up event or a log line. On failure
    /// or timeout the record falls back to pending manual review rather
    /// than staying silently half-scored.
    fn spawn_deferred_rescore(&self, report: Report, classifier: Arc<dyn Classifier>) {
        let db = self.db.clone();
        let state = Arc::clone(&self.state);
        let router = self.router.clone();
        let publish_threshold = self.publish_threshold;
        let deadline = self.classifier_timeout;

        tokio::spawn(async move {
            let outcome = timeout(
                deadline,
                classifier.classify(&report.description, report.evidence_images.len(), report.category),
            )
            .await;

            let updated = match outcome {
                Ok(Ok(rescored)) => {
                    db::reports::update_classification(
                        &db,
                        report.id,
                        rescored.confidence,
                        rescored.status,
                        rescored.priority,
                        rescored.verification_tag,
                        &rescored.explanation,
                    )
                    .await
                }
                Ok(Err(e)) => {
                    warn!(report_id = %report.id, error = %e, "deferred classifier failed; falling back to pending review");
                    fallback_to_pending_review(&db, &report).await
                }
                Err(_) => {
                    warn!(report_id = %report.id, "deferred classifier timed out; falling back to pending review");
                    fallback_to_pending_review(&db, &report).await
                }
            };

            match updated {
                Ok(updated) => {
                    state.cache_report(updated.clone()).await;
                    if updated.confidence >= publish_threshold {
                        router.report_published(&updated);
                    }
                }
                Err(Error::NotFound(_)) => {
                    // The report went terminal while the re-score was in
                    // flight; terminal records are never mutated.
                    debug!(report_id = %report.id, "skipping re-score of terminal report");
                }
                Err(e) => warn!(report_id = %report.id, error = %e, "deferred re-score not persisted"),
            }
        });
    }

    /// Dashboard-issued status transition
    ///
    /// Terminal records reject further transitions.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: ReportStatus,
        resolution: Option<String>,
        resolved_by: Option<String>,
    ) -> Result<Report> {
        let current = db::reports::find_by_id(&self.db, id).await?;
        if current.status.is_terminal() {
            return Err(Error::Validation(format!(
                "report {} is already {} and cannot transition",
                id, current.status
            )));
        }

        let updated = db::reports::update_status(
            &self.db,
            id,
            status,
            resolution.as_deref(),
            resolved_by.as_deref(),
        )
        .await?;

        if updated.status.is_terminal() {
            self.state.evict_report(id).await;
        } else {
            self.state.cache_report(updated.clone()).await;
        }
        self.router.report_status_updated(&updated);
        Ok(updated)
    }

    /// Record a feedback vote; two distinct `real` voters upgrade the
    /// report to confirmed-real. Returns whether the report is confirmed.
    pub async fn record_feedback(
        &self,
        report_id: Uuid,
        report_text: String,
        vote: FeedbackVote,
        voter_id: Option<String>,
        location: Option<String>,
    ) -> Result<bool> {
        db::feedback::insert_vote(
            &self.db,
            report_id,
            &report_text,
            vote,
            voter_id.as_deref(),
            location.as_deref(),
        )
        .await?;

        let mut confirmed = false;
        if vote == FeedbackVote::Real {
            let voters = db::feedback::distinct_real_voters(&self.db, report_id).await?;
            if voters >= db::feedback::CONFIRM_THRESHOLD {
                db::feedback::mark_confirmed(&self.db, report_id).await?;
                confirmed = true;
                self.upgrade_confirmed_report(report_id).await?;
            }
        }

        self.router
            .feedback_recorded(report_id, vote, voter_id, confirmed);
        Ok(confirmed)
    }

    async fn upgrade_confirmed_report(&self, report_id: Uuid) -> Result<()> {
        match db::reports::find_by_id(&self.db, report_id).await {
            Ok(report) if !report.status.is_terminal() && report.status != ReportStatus::ConfirmedReal => {
                let updated = db::reports::update_status(
                    &self.db,
                    report_id,
                    ReportStatus::ConfirmedReal,
                    None,
                    None,
                )
                .await?;
                self.state.cache_report(updated.clone()).await;
                self.router.report_status_updated(&updated);
            }
            Ok(_) => {}
            Err(Error::NotFound(_)) => {
                // Votes may reference a report this instance never stored;
                // the consensus is still recorded against the vote rows.
                warn!(report_id = %report_id, "confirmed-real consensus for unknown report");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Dashboard-join snapshot: everything currently actionable
    ///
    /// Suppressed records (below the publish threshold) stay out of this
    /// view, though they remain queryable by id.
    pub async fn dashboard_snapshot(&self) -> Result<Vec<Report>> {
        let filter = db::reports::ReportFilter {
            min_confidence: Some(self.publish_threshold),
            ..Default::default()
        };
        db::reports::list(&self.db, &filter).await
    }

    // ------------------------------------------------------------------
    // SOS lifecycle (in-memory only)
    // ------------------------------------------------------------------

    /// Raise a new SOS and fan it out to peers and the dashboard
    pub async fn raise_sos(&self, request: SosRequest) -> Result<SosEvent> {
        validate_identity(&request.user_id, &request.user_name)?;
        validate_coordinates(request.latitude, request.longitude)?;

        let sos = SosEvent {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            user_name: request.user_name,
            location: Location {
                latitude: request.latitude,
                longitude: request.longitude,
                address: request.address,
                campus: Some(self.default_campus.clone()),
            },
            message: request.message,
            status: SosStatus::Active,
            acknowledgments: Vec::new(),
            raised_at: Utc::now(),
        };

        self.state.insert_sos(sos.clone()).await;
        self.router.sos_raised(&sos);
        info!(sos_id = %sos.id, user_id = %sos.user_id, "SOS raised");
        Ok(sos)
    }

    /// Live location update for an active SOS
    pub async fn update_sos_location(&self, id: Uuid, latitude: f64, longitude: f64) -> Result<SosEvent> {
        validate_coordinates(latitude, longitude)?;
        let updated = self
            .state
            .update_sos_location(id, latitude, longitude)
            .await
            .ok_or_else(|| Error::NotFound(format!("SOS {}", id)))?;
        self.router.sos_location_updated(&updated);
        Ok(updated)
    }

    /// A friend acknowledges an SOS; only the originator is notified
    pub async fn acknowledge_sos(
        &self,
        id: Uuid,
        friend_id: String,
        friend_name: String,
    ) -> Result<SosEvent> {
        if friend_id.trim().is_empty() {
            return Err(Error::Validation("acknowledging friend id is required".into()));
        }
        let ack = SosAck {
            friend_id: friend_id.clone(),
            friend_name: friend_name.clone(),
            acknowledged_at: Utc::now(),
        };
        let updated = self
            .state
            .acknowledge_sos(id, ack)
            .await
            .ok_or_else(|| Error::NotFound(format!("SOS {}", id)))?;
        self.router.sos_acknowledged(&updated, &friend_id, &friend_name);
        Ok(updated)
    }

    /// Terminal SOS transition, allowed only for the originating user
    pub async fn end_sos(&self, id: Uuid, user_id: &str) -> Result<SosEvent> {
        let current = self
            .state
            .sos(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("SOS {}", id)))?;
        if current.user_id != user_id {
            return Err(Error::Validation(format!(
                "only the originating user may end SOS {}",
                id
            )));
        }

        let ended = self
            .state
            .end_sos(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("SOS {}", id)))?;
        self.router.sos_ended(&ended);
        info!(sos_id = %id, "SOS ended");
        Ok(ended)
    }

    /// All currently active SOS events, newest first
    pub async fn active_sos(&self) -> Vec<SosEvent> {
        self.state.active_sos().await
    }

    // ------------------------------------------------------------------
    // Direct messages
    // ------------------------------------------------------------------

    /// Persist a direct message and notify the recipient's room
    pub async fn send_message(&self, send: SendMessage) -> Result<Message> {
        validate_identity(&send.sender_id, &send.sender_name)?;
        if send.recipient_id.trim().is_empty() {
            return Err(Error::Validation("recipient id is required".into()));
        }
        if send.body.trim().is_empty() {
            return Err(Error::Validation("message body is required".into()));
        }

        let message_type = match send.message_type.as_deref() {
            Some(raw) => raw.parse::<MessageType>()?,
            None => MessageType::default(),
        };

        let message = Message {
            id: Uuid::new_v4(),
            sender_id: send.sender_id,
            sender_name: send.sender_name,
            recipient_id: send.recipient_id,
            body: send.body,
            message_type,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };

        db::messages::insert(&self.db, &message).await?;
        self.router.message_sent(&message);
        Ok(message)
    }
}

async fn fallback_to_pending_review(db: &Pool<Sqlite>, report: &Report) -> Result<Report> {
    db::reports::update_classification(
        db,
        report.id,
        report.confidence,
        ReportStatus::PendingReview,
        report.priority,
        report.verification_tag,
        &format!("{}; automatic re-score unavailable", report.explanation),
    )
    .await
}

fn validate_identity(user_id: &str, user_name: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::Validation("user id is required".into()));
    }
    if user_name.trim().is_empty() {
        return Err(Error::Validation("user name is required".into()));
    }
    Ok(())
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(Error::Validation("coordinates must be finite numbers".into()));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::Validation(format!("latitude {} out of range", latitude)));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::Validation(format!("longitude {} out of range", longitude)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_validation() {
        assert!(validate_coordinates(3.12, 101.65).is_ok());
        assert!(validate_coordinates(91.0, 0.0).is_err());
        assert!(validate_coordinates(0.0, -181.0).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
        assert!(validate_coordinates(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn identity_validation() {
        assert!(validate_identity("u-1", "Aisyah").is_ok());
        assert!(validate_identity("", "Aisyah").is_err());
        assert!(validate_identity("u-1", "   ").is_err());
    }
}
