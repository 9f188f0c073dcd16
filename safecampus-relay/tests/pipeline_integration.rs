//! Integration tests for the alert/SOS lifecycle controller
//!
//! Drives the pipeline directly against an in-memory store and asserts on
//! both persisted state and the envelopes that reach the event bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tokio::sync::broadcast::error::TryRecvError;
use uuid::Uuid;

use safecampus_common::events::{Audience, Envelope, RelayEvent};
use safecampus_common::model::{Category, FeedbackVote, Priority, ReportStatus, Role, VerificationTag};

use safecampus_relay::config::Config;
use safecampus_relay::db;
use safecampus_relay::error::Error;
use safecampus_relay::pipeline::{AlertPipeline, IntakeOutcome, NewReport, SendMessage, SosRequest};
use safecampus_relay::router::BroadcastRouter;
use safecampus_relay::scoring::{Classifier, ScoreResult};
use safecampus_relay::state::SharedState;

async fn memory_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::initialize_schema(&pool).await.unwrap();
    pool
}

async fn setup_pipeline(
    reclassifier: Option<Arc<dyn Classifier>>,
    config: Config,
) -> (Arc<AlertPipeline>, Arc<SharedState>, Pool<Sqlite>) {
    let pool = memory_pool().await;
    let state = Arc::new(SharedState::new(64));
    let router = BroadcastRouter::new(state.bus.clone());
    let pipeline = Arc::new(AlertPipeline::new(
        pool.clone(),
        Arc::clone(&state),
        router,
        &config,
        reclassifier,
    ));
    (pipeline, state, pool)
}

fn new_report(user_id: &str, description: &str, category: &str) -> NewReport {
    NewReport {
        user_id: user_id.into(),
        user_name: "Aisyah".into(),
        user_phone: Some("+60123456789".into()),
        description: Some(description.into()),
        latitude: 3.1201,
        longitude: 101.6544,
        address: Some("Main Library".into()),
        campus: None,
        category: Some(category.into()),
        evidence_images: Vec::new(),
    }
}

fn expect_event(rx: &mut tokio::sync::broadcast::Receiver<Envelope>, name: &str) -> Envelope {
    match rx.try_recv() {
        Ok(envelope) => {
            assert_eq!(envelope.event.name(), name, "unexpected event order");
            envelope
        }
        Err(e) => panic!("expected {} but bus was {:?}", name, e),
    }
}

fn assert_no_events(rx: &mut tokio::sync::broadcast::Receiver<Envelope>) {
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn high_confidence_report_is_published_to_the_dashboard() {
    let (pipeline, state, pool) = setup_pipeline(None, Config::default()).await;
    let mut rx = state.bus.subscribe();

    let outcome = pipeline
        .submit_report(new_report("u-1", "armed robbery suspect near library", "Theft/Robbery"))
        .await
        .unwrap();
    let report = match outcome {
        IntakeOutcome::Accepted(report) => report,
        IntakeOutcome::Duplicate => panic!("first submission must be accepted"),
    };

    assert!(report.confidence >= 85);
    assert_eq!(report.priority, Priority::Critical);
    assert_eq!(report.status, ReportStatus::Verified);
    // The campus label falls back to the configured default
    assert_eq!(report.location.campus.as_deref(), Some("University Malaya"));

    let update = expect_event(&mut rx, "report_update");
    assert_eq!(update.audience, Audience::Role(Role::Dashboard));
    match update.event {
        RelayEvent::ReportUpdate { report: published } => assert_eq!(published.id, report.id),
        other => panic!("unexpected event {:?}", other),
    }

    let request = expect_event(&mut rx, "feedback_request");
    assert_eq!(request.audience, Audience::All);

    // Persisted and cached
    let stored = db::reports::find_by_id(&pool, report.id).await.unwrap();
    assert_eq!(stored.confidence, report.confidence);
    assert!(state.cached_report(report.id).await.is_some());
}

#[tokio::test]
async fn low_confidence_report_is_persisted_but_suppressed() {
    let (pipeline, state, pool) = setup_pipeline(None, Config::default()).await;
    let mut rx = state.bus.subscribe();

    let outcome = pipeline
        .submit_report(new_report("u-1", "just testing this demo", "Other"))
        .await
        .unwrap();
    let report = match outcome {
        IntakeOutcome::Accepted(report) => report,
        IntakeOutcome::Duplicate => panic!("first submission must be accepted"),
    };

    assert!(report.confidence <= 25);
    assert_eq!(report.status, ReportStatus::Unverified);

    // No broadcast at all below the publish threshold
    assert_no_events(&mut rx);

    // Still queryable by id, but absent from the dashboard snapshot
    assert!(db::reports::find_by_id(&pool, report.id).await.is_ok());
    let snapshot = pipeline.dashboard_snapshot().await.unwrap();
    assert!(snapshot.iter().all(|r| r.id != report.id));
}

#[tokio::test]
async fn duplicate_submission_is_rejected_until_the_window_expires() {
    // Real clock with a 1s window: pausing time is not an option while the
    // store is doing real I/O on a background thread.
    let config = Config {
        dedup_window_secs: 1,
        ..Default::default()
    };
    let (pipeline, _state, pool) = setup_pipeline(None, config).await;

    let first = pipeline
        .submit_report(new_report("u-1", "suspicious person near the dorms", "Suspicious Person"))
        .await
        .unwrap();
    assert!(matches!(first, IntakeOutcome::Accepted(_)));

    let second = pipeline
        .submit_report(new_report("u-1", "suspicious person near the dorms", "Suspicious Person"))
        .await
        .unwrap();
    assert!(matches!(second, IntakeOutcome::Duplicate));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    // After the window the same tuple is accepted again
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let third = pipeline
        .submit_report(new_report("u-1", "suspicious person near the dorms", "Suspicious Person"))
        .await
        .unwrap();
    assert!(matches!(third, IntakeOutcome::Accepted(_)));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn submission_with_missing_identity_is_a_validation_error() {
    let (pipeline, state, _pool) = setup_pipeline(None, Config::default()).await;
    let mut rx = state.bus.subscribe();

    let err = pipeline
        .submit_report(new_report("", "help", "Other"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = pipeline
        .submit_report(NewReport {
            latitude: 123.0,
            ..new_report("u-1", "help", "Other")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // No partial state: nothing was broadcast
    assert_no_events(&mut rx);
}

#[tokio::test]
async fn status_transitions_are_broadcast_and_terminal_states_stick() {
    let (pipeline, state, _pool) = setup_pipeline(None, Config::default()).await;

    let report = match pipeline
        .submit_report(new_report("u-1", "someone has a gun", "Other"))
        .await
        .unwrap()
    {
        IntakeOutcome::Accepted(report) => report,
        IntakeOutcome::Duplicate => unreachable!(),
    };

    let mut rx = state.bus.subscribe();
    let updated = pipeline
        .update_status(report.id, ReportStatus::Investigating, None, None)
        .await
        .unwrap();
    assert_eq!(updated.status, ReportStatus::Investigating);

    let envelope = expect_event(&mut rx, "report_status_updated");
    assert_eq!(envelope.audience, Audience::Role(Role::Dashboard));

    let resolved = pipeline
        .update_status(
            report.id,
            ReportStatus::Resolved,
            Some("patrol responded".into()),
            Some("officer-7".into()),
        )
        .await
        .unwrap();
    assert!(resolved.resolved_at.is_some());
    expect_event(&mut rx, "report_status_updated");

    // Terminal records are evicted from the cache and reject transitions
    assert!(state.cached_report(report.id).await.is_none());
    let err = pipeline
        .update_status(report.id, ReportStatus::Investigating, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // And the dashboard snapshot no longer lists them
    let snapshot = pipeline.dashboard_snapshot().await.unwrap();
    assert!(snapshot.iter().all(|r| r.id != report.id));
}

#[tokio::test]
async fn status_update_on_unknown_id_is_not_found() {
    let (pipeline, _state, _pool) = setup_pipeline(None, Config::default()).await;
    let err = pipeline
        .update_status(Uuid::new_v4(), ReportStatus::Resolved, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn two_distinct_real_votes_confirm_a_report() {
    let (pipeline, state, _pool) = setup_pipeline(None, Config::default()).await;

    let report = match pipeline
        .submit_report(new_report("u-1", "someone has a gun", "Other"))
        .await
        .unwrap()
    {
        IntakeOutcome::Accepted(report) => report,
        IntakeOutcome::Duplicate => unreachable!(),
    };

    let mut rx = state.bus.subscribe();

    let confirmed = pipeline
        .record_feedback(
            report.id,
            report.description.clone(),
            FeedbackVote::Real,
            Some("voter-1".into()),
            None,
        )
        .await
        .unwrap();
    assert!(!confirmed);
    expect_event(&mut rx, "feedback_response");

    let confirmed = pipeline
        .record_feedback(
            report.id,
            report.description.clone(),
            FeedbackVote::Real,
            Some("voter-2".into()),
            None,
        )
        .await
        .unwrap();
    assert!(confirmed);

    // The upgrade is broadcast before the vote confirmation
    let status_event = expect_event(&mut rx, "report_status_updated");
    match status_event.event {
        RelayEvent::ReportStatusUpdated { status, .. } => {
            assert_eq!(status, ReportStatus::ConfirmedReal)
        }
        other => panic!("unexpected event {:?}", other),
    }
    expect_event(&mut rx, "feedback_response");

    let upgraded = pipeline.dashboard_snapshot().await.unwrap();
    assert!(upgraded
        .iter()
        .any(|r| r.id == report.id && r.status == ReportStatus::ConfirmedReal));
}

#[tokio::test]
async fn repeat_votes_from_one_user_do_not_confirm() {
    let (pipeline, _state, _pool) = setup_pipeline(None, Config::default()).await;
    let report_id = Uuid::new_v4();

    for _ in 0..3 {
        let confirmed = pipeline
            .record_feedback(report_id, "text".into(), FeedbackVote::Real, Some("voter-1".into()), None)
            .await
            .unwrap();
        assert!(!confirmed);
    }
}

#[tokio::test]
async fn sos_lifecycle_raise_acknowledge_end() {
    let (pipeline, state, _pool) = setup_pipeline(None, Config::default()).await;
    let mut rx = state.bus.subscribe();

    let sos = pipeline
        .raise_sos(SosRequest {
            user_id: "u-1".into(),
            user_name: "Aisyah".into(),
            latitude: 3.1201,
            longitude: 101.6544,
            address: None,
            message: Some("walking alone, being followed".into()),
        })
        .await
        .unwrap();

    // Dual emission: peers first, then the dashboard copy
    let peer = expect_event(&mut rx, "friend_sos_alert");
    assert_eq!(peer.audience, Audience::All);
    let dash = expect_event(&mut rx, "security_sos_alert");
    assert_eq!(dash.audience, Audience::Role(Role::Dashboard));

    // Two distinct friends acknowledge; the originator alone is notified
    pipeline
        .acknowledge_sos(sos.id, "f-1".into(), "Mei".into())
        .await
        .unwrap();
    let ack = expect_event(&mut rx, "sos_acknowledged");
    assert_eq!(ack.audience, Audience::User("u-1".into()));

    let updated = pipeline
        .acknowledge_sos(sos.id, "f-2".into(), "Ravi".into())
        .await
        .unwrap();
    assert_eq!(updated.acknowledgments.len(), 2);
    expect_event(&mut rx, "sos_acknowledged");

    // Location updates fan out to both audiences
    pipeline
        .update_sos_location(sos.id, 3.1250, 101.6600)
        .await
        .unwrap();
    let loc_peer = expect_event(&mut rx, "friend_location_update");
    assert_eq!(loc_peer.audience, Audience::All);
    expect_event(&mut rx, "sos_location_update");

    // Only the originator may end it
    let err = pipeline.end_sos(sos.id, "f-1").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    pipeline.end_sos(sos.id, "u-1").await.unwrap();
    let ended = expect_event(&mut rx, "friend_sos_ended");
    assert_eq!(ended.audience, Audience::All);

    // Gone from active queries and from acknowledgment bookkeeping
    assert!(pipeline.active_sos().await.is_empty());
    let err = pipeline
        .acknowledge_sos(sos.id, "f-3".into(), "Lee".into())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn direct_message_reaches_the_recipient_room_only() {
    let (pipeline, state, pool) = setup_pipeline(None, Config::default()).await;
    let mut rx = state.bus.subscribe();

    let message = pipeline
        .send_message(SendMessage {
            sender_id: "u-1".into(),
            sender_name: "Aisyah".into(),
            recipient_id: "u-2".into(),
            body: "reached the station".into(),
            message_type: None,
        })
        .await
        .unwrap();

    let envelope = expect_event(&mut rx, "new_message");
    assert_eq!(envelope.audience, Audience::User("u-2".into()));

    let thread = db::messages::conversation(&pool, "u-1", "u-2", 10).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].id, message.id);
}

// ----------------------------------------------------------------------
// Deferred re-scoring through the classifier seam
// ----------------------------------------------------------------------

struct BoostClassifier;

#[async_trait]
impl Classifier for BoostClassifier {
    async fn classify(&self, _description: &str, _images: usize, _category: Category) -> safecampus_relay::Result<ScoreResult> {
        Ok(ScoreResult {
            confidence: 90,
            status: ReportStatus::Verified,
            priority: Priority::High,
            verification_tag: VerificationTag::Verified,
            explanation: "90% authenticity estimate: external model".into(),
        })
    }
}

struct StalledClassifier;

#[async_trait]
impl Classifier for StalledClassifier {
    async fn classify(&self, _description: &str, _images: usize, _category: Category) -> safecampus_relay::Result<ScoreResult> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("the pipeline times this call out")
    }
}

async fn wait_for_confidence(pool: &Pool<Sqlite>, id: Uuid, expected: u8) -> bool {
    for _ in 0..100 {
        let report = db::reports::find_by_id(pool, id).await.unwrap();
        if report.confidence == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_for_status(pool: &Pool<Sqlite>, id: Uuid, expected: ReportStatus) -> bool {
    for _ in 0..100 {
        let report = db::reports::find_by_id(pool, id).await.unwrap();
        if report.status == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn middle_band_report_is_rescored_and_followed_up() {
    let (pipeline, state, pool) =
        setup_pipeline(Some(Arc::new(BoostClassifier)), Config::default()).await;
    let mut rx = state.bus.subscribe();

    // One high-severity term lands in the ambiguous middle band
    let report = match pipeline
        .submit_report(new_report("u-1", "someone has a gun", "Other"))
        .await
        .unwrap()
    {
        IntakeOutcome::Accepted(report) => report,
        IntakeOutcome::Duplicate => unreachable!(),
    };
    assert!(report.confidence >= 30 && report.confidence < 70);

    assert!(wait_for_confidence(&pool, report.id, 90).await);
    let rescored = db::reports::find_by_id(&pool, report.id).await.unwrap();
    assert_eq!(rescored.status, ReportStatus::Verified);

    // Initial publish, feedback request, then the follow-up update
    expect_event(&mut rx, "report_update");
    expect_event(&mut rx, "feedback_request");
    let followup = expect_event(&mut rx, "report_update");
    match followup.event {
        RelayEvent::ReportUpdate { report: updated } => assert_eq!(updated.confidence, 90),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn stalled_classifier_falls_back_to_pending_review() {
    let config = Config {
        classifier_timeout_secs: 0,
        ..Default::default()
    };
    let (pipeline, _state, pool) =
        setup_pipeline(Some(Arc::new(StalledClassifier)), config).await;

    let report = match pipeline
        .submit_report(new_report("u-1", "someone has a gun", "Other"))
        .await
        .unwrap()
    {
        IntakeOutcome::Accepted(report) => report,
        IntakeOutcome::Duplicate => unreachable!(),
    };

    assert!(wait_for_status(&pool, report.id, ReportStatus::PendingReview).await);
    let fallen_back = db::reports::find_by_id(&pool, report.id).await.unwrap();
    // Confidence is untouched; only the status is conservatively downgraded
    assert_eq!(fallen_back.confidence, report.confidence);
}

#[tokio::test]
async fn high_confidence_report_skips_the_deferred_path() {
    let (pipeline, _state, pool) =
        setup_pipeline(Some(Arc::new(BoostClassifier)), Config::default()).await;

    let report = match pipeline
        .submit_report(new_report("u-1", "armed robbery suspect near library", "Theft/Robbery"))
        .await
        .unwrap()
    {
        IntakeOutcome::Accepted(report) => report,
        IntakeOutcome::Duplicate => unreachable!(),
    };
    assert!(report.confidence >= 70);

    // Give any (incorrect) deferred task a chance to run, then confirm
    // the record kept its intake classification
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stored = db::reports::find_by_id(&pool, report.id).await.unwrap();
    assert_eq!(stored.confidence, report.confidence);
}
