//! HTTP request handlers
//!
//! REST endpoints for report intake, dashboard queries, the SOS lifecycle,
//! friends, direct messages, verification codes, and presence.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use safecampus_common::model::{
    FeedbackVote, Friend, FriendStatus, Message, Report, ReportStatus, SosEvent,
};
use safecampus_common::relative_time::{is_recent, last_seen_label};

use crate::api::AppContext;
use crate::db;
use crate::db::reports::ReportFilter;
use crate::db::verification::VerifyOutcome;
use crate::error::{Error, Result};
use crate::pipeline::{IntakeOutcome, NewReport, SendMessage, SosRequest};
use crate::registry::PresenceView;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    statistics: HealthStatistics,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthStatistics {
    active_alerts: usize,
    active_sos: usize,
    connected_mobile: usize,
    connected_dashboard: usize,
}

#[derive(Debug, Serialize)]
pub struct SubmitReportResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<Report>,
}

#[derive(Debug, Deserialize)]
pub struct ListReportsQuery {
    /// Comma-separated statuses to exclude; defaults to the terminal set
    pub exclude: Option<String>,
    pub min_confidence: Option<u8>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReportListResponse {
    reports: Vec<Report>,
    count: usize,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    success: bool,
    report: Report,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequestBody {
    pub report_id: Uuid,
    pub report_text: String,
    pub feedback: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponseBody {
    success: bool,
    confirmed_real: bool,
}

#[derive(Debug, Serialize)]
pub struct SosResponse {
    success: bool,
    sos: SosEvent,
}

#[derive(Debug, Serialize)]
pub struct SosListResponse {
    sos: Vec<SosEvent>,
    count: usize,
}

#[derive(Debug, Deserialize)]
pub struct SosLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct SosAckRequest {
    pub friend_id: String,
    pub friend_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SosEndRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddFriendRequest {
    pub user_id: String,
    pub friend_email: String,
    #[serde(default)]
    pub profile_color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddFriendResponse {
    success: bool,
    friend: Friend,
}

/// A friendship edge decorated with live presence
#[derive(Debug, Serialize)]
pub struct FriendView {
    #[serde(flatten)]
    friend: Friend,
    online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen_label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FriendListResponse {
    friends: Vec<FriendView>,
    count: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    success: bool,
    message: Message,
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    messages: Vec<Message>,
    count: usize,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub user_id: String,
    pub peer_id: String,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    success: bool,
    updated: u64,
}

#[derive(Debug, Deserialize)]
pub struct IssueCodeRequest {
    pub email: String,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueCodeResponse {
    success: bool,
    /// Handed to the external mail service by the caller; the relay does
    /// not send email itself
    code: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    success: bool,
    verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts_remaining: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub user_id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PresencePingRequest {
    pub user_id: String,
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check with live statistics
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let (mobile, dashboard) = ctx.registry.counts();
    Json(HealthResponse {
        status: "running".to_string(),
        module: "safecampus-relay".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        statistics: HealthStatistics {
            active_alerts: ctx.state.active_alert_count().await,
            active_sos: ctx.state.active_sos().await.len(),
            connected_mobile: mobile,
            connected_dashboard: dashboard,
        },
        timestamp: Utc::now(),
    })
}

// ============================================================================
// Report Endpoints
// ============================================================================

/// POST /api/v1/reports - Submit a new report
///
/// A duplicate inside the suppression window is a 200 with success=false,
/// not an error; the submitter is told why.
pub async fn submit_report(
    State(ctx): State<AppContext>,
    Json(new): Json<NewReport>,
) -> Result<Json<SubmitReportResponse>> {
    match ctx.pipeline.submit_report(new).await? {
        IntakeOutcome::Accepted(report) => Ok(Json(SubmitReportResponse {
            success: true,
            reason: None,
            report: Some(report),
        })),
        IntakeOutcome::Duplicate => Ok(Json(SubmitReportResponse {
            success: false,
            reason: Some("duplicate submission within the suppression window".to_string()),
            report: None,
        })),
    }
}

/// GET /api/v1/reports - List reports, newest first
pub async fn list_reports(
    State(ctx): State<AppContext>,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<ReportListResponse>> {
    let mut filter = ReportFilter::default();

    if let Some(raw) = &query.exclude {
        let mut excluded = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            excluded.push(part.parse::<ReportStatus>()?);
        }
        filter.exclude_statuses = excluded;
    }
    if let Some(min) = query.min_confidence {
        filter.min_confidence = Some(min);
    }
    if let Some(limit) = query.limit {
        filter.limit = limit.clamp(1, 200);
    }
    if let Some(offset) = query.offset {
        filter.offset = offset.max(0);
    }

    let reports = db::reports::list(&ctx.db_pool, &filter).await?;
    Ok(Json(ReportListResponse {
        count: reports.len(),
        reports,
    }))
}

/// GET /api/v1/reports/:id - Fetch one report
pub async fn get_report(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Report>> {
    let report = db::reports::find_by_id(&ctx.db_pool, id).await?;
    Ok(Json(report))
}

/// POST /api/v1/reports/:id/status - Dashboard-issued status transition
pub async fn update_report_status(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ReportResponse>> {
    let status: ReportStatus = request.status.parse()?;
    let report = ctx
        .pipeline
        .update_status(id, status, request.resolution, request.resolved_by)
        .await?;
    Ok(Json(ReportResponse {
        success: true,
        report,
    }))
}

// ============================================================================
// Feedback Endpoint
// ============================================================================

/// POST /api/v1/feedback - Record an authenticity vote
pub async fn submit_feedback(
    State(ctx): State<AppContext>,
    Json(body): Json<FeedbackRequestBody>,
) -> Result<Json<FeedbackResponseBody>> {
    if body.report_text.trim().is_empty() {
        return Err(Error::Validation("report text is required".into()));
    }
    let vote: FeedbackVote = body.feedback.parse()?;
    let confirmed_real = ctx
        .pipeline
        .record_feedback(body.report_id, body.report_text, vote, body.user_id, body.location)
        .await?;
    Ok(Json(FeedbackResponseBody {
        success: true,
        confirmed_real,
    }))
}

// ============================================================================
// SOS Endpoints
// ============================================================================

/// POST /api/v1/sos - Raise an SOS
pub async fn raise_sos(
    State(ctx): State<AppContext>,
    Json(request): Json<SosRequest>,
) -> Result<Json<SosResponse>> {
    ctx.registry.touch(&request.user_id);
    let sos = ctx.pipeline.raise_sos(request).await?;
    Ok(Json(SosResponse { success: true, sos }))
}

/// GET /api/v1/sos - List active SOS events
pub async fn list_active_sos(State(ctx): State<AppContext>) -> Json<SosListResponse> {
    let sos = ctx.pipeline.active_sos().await;
    Json(SosListResponse {
        count: sos.len(),
        sos,
    })
}

/// POST /api/v1/sos/:id/location - Live location update for an SOS
pub async fn sos_location(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<SosLocationRequest>,
) -> Result<Json<SosResponse>> {
    let sos = ctx
        .pipeline
        .update_sos_location(id, request.latitude, request.longitude)
        .await?;
    ctx.registry.touch(&sos.user_id);
    Ok(Json(SosResponse { success: true, sos }))
}

/// POST /api/v1/sos/:id/ack - Friend acknowledges an SOS
pub async fn acknowledge_sos(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<SosAckRequest>,
) -> Result<Json<SosResponse>> {
    ctx.registry.touch(&request.friend_id);
    let sos = ctx
        .pipeline
        .acknowledge_sos(id, request.friend_id, request.friend_name)
        .await?;
    Ok(Json(SosResponse { success: true, sos }))
}

/// POST /api/v1/sos/:id/end - Originating user ends the SOS
pub async fn end_sos(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<SosEndRequest>,
) -> Result<Json<StatusResponse>> {
    ctx.pipeline.end_sos(id, &request.user_id).await?;
    Ok(Json(StatusResponse { success: true }))
}

// ============================================================================
// Friends Endpoints
// ============================================================================

/// POST /api/v1/friends - Add a friend by email lookup
pub async fn add_friend(
    State(ctx): State<AppContext>,
    Json(request): Json<AddFriendRequest>,
) -> Result<Json<AddFriendResponse>> {
    if request.user_id.trim().is_empty() {
        return Err(Error::Validation("user id is required".into()));
    }

    let found = db::users::find_by_email(&ctx.db_pool, &request.friend_email)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no user with email {}", request.friend_email)))?;

    if found.user_id == request.user_id {
        return Err(Error::Validation("cannot add yourself as a friend".into()));
    }

    let username = found
        .email
        .split('@')
        .next()
        .unwrap_or(&found.email)
        .to_string();
    let friend = Friend {
        user_id: request.user_id,
        friend_id: found.user_id,
        friend_name: found.name,
        friend_email: found.email,
        friend_username: username,
        profile_color: request.profile_color.unwrap_or_else(|| "blue".to_string()),
        status: FriendStatus::Accepted,
        added_at: Utc::now(),
    };
    db::friends::add(&ctx.db_pool, &friend).await?;
    Ok(Json(AddFriendResponse {
        success: true,
        friend,
    }))
}

/// GET /api/v1/friends/:user_id - List friends with live presence
pub async fn list_friends(
    State(ctx): State<AppContext>,
    Path(user_id): Path<String>,
) -> Result<Json<FriendListResponse>> {
    let friends = db::friends::list(&ctx.db_pool, &user_id).await?;
    let views = friends
        .into_iter()
        .map(|friend| {
            let presence = ctx.registry.presence(&friend.friend_id);
            match presence {
                Some(view) => FriendView {
                    friend,
                    online: view.online,
                    last_seen_label: Some(view.last_seen_label),
                },
                None => FriendView {
                    friend,
                    online: false,
                    last_seen_label: None,
                },
            }
        })
        .collect::<Vec<_>>();
    Ok(Json(FriendListResponse {
        count: views.len(),
        friends: views,
    }))
}

// ============================================================================
// Message Endpoints
// ============================================================================

/// POST /api/v1/messages - Send a direct message
pub async fn send_message(
    State(ctx): State<AppContext>,
    Json(request): Json<SendMessage>,
) -> Result<Json<MessageResponse>> {
    ctx.registry.touch(&request.sender_id);
    let message = ctx.pipeline.send_message(request).await?;
    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}

/// GET /api/v1/messages/:user_id/:peer_id - Conversation history
pub async fn conversation(
    State(ctx): State<AppContext>,
    Path((user_id, peer_id)): Path<(String, String)>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<ConversationResponse>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let messages = db::messages::conversation(&ctx.db_pool, &user_id, &peer_id, limit).await?;
    Ok(Json(ConversationResponse {
        count: messages.len(),
        messages,
    }))
}

/// POST /api/v1/messages/read - Mark a peer's messages as read
pub async fn mark_messages_read(
    State(ctx): State<AppContext>,
    Json(request): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>> {
    let updated = db::messages::mark_read(&ctx.db_pool, &request.user_id, &request.peer_id).await?;
    Ok(Json(MarkReadResponse {
        success: true,
        updated,
    }))
}

// ============================================================================
// Verification Endpoints
// ============================================================================

/// POST /api/v1/verification/issue - Issue a 6-digit code
pub async fn issue_verification_code(
    State(ctx): State<AppContext>,
    Json(request): Json<IssueCodeRequest>,
) -> Result<Json<IssueCodeResponse>> {
    if !request.email.contains('@') {
        return Err(Error::Validation(format!("invalid email: {}", request.email)));
    }
    let purpose = request.purpose.as_deref().unwrap_or("email_verification");
    let issued = db::verification::issue(
        &ctx.db_pool,
        &request.email,
        purpose,
        ctx.config.verification_code_ttl_secs,
        ctx.config.verification_max_attempts,
    )
    .await?;
    Ok(Json(IssueCodeResponse {
        success: true,
        code: issued.code,
        expires_at: issued.expires_at,
    }))
}

/// POST /api/v1/verification/verify - Verify a code
///
/// Unknown/expired codes are 404, exhausted attempts are 429; a wrong code
/// with budget remaining is a 200 with verified=false.
pub async fn verify_code(
    State(ctx): State<AppContext>,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<Json<VerifyCodeResponse>> {
    match db::verification::verify(&ctx.db_pool, &request.email, &request.code).await? {
        VerifyOutcome::Verified => Ok(Json(VerifyCodeResponse {
            success: true,
            verified: true,
            attempts_remaining: None,
        })),
        VerifyOutcome::Incorrect { attempts_remaining } => Ok(Json(VerifyCodeResponse {
            success: false,
            verified: false,
            attempts_remaining: Some(attempts_remaining),
        })),
    }
}

// ============================================================================
// User Directory and Presence Endpoints
// ============================================================================

/// POST /api/v1/users - Create or refresh a user profile
pub async fn upsert_user(
    State(ctx): State<AppContext>,
    Json(request): Json<UpsertUserRequest>,
) -> Result<Json<StatusResponse>> {
    if request.user_id.trim().is_empty() || request.name.trim().is_empty() {
        return Err(Error::Validation("user id and name are required".into()));
    }
    if !request.email.contains('@') {
        return Err(Error::Validation(format!("invalid email: {}", request.email)));
    }
    db::users::upsert(
        &ctx.db_pool,
        &request.user_id,
        &request.email,
        &request.name,
        request.phone.as_deref(),
    )
    .await?;
    Ok(Json(StatusResponse { success: true }))
}

/// POST /api/v1/presence/ping - Activity touch for a user
pub async fn presence_ping(
    State(ctx): State<AppContext>,
    Json(request): Json<PresencePingRequest>,
) -> Result<Json<StatusResponse>> {
    if request.user_id.trim().is_empty() {
        return Err(Error::Validation("user id is required".into()));
    }
    ctx.registry.touch(&request.user_id);
    db::users::set_active(&ctx.db_pool, &request.user_id, true).await?;
    Ok(Json(StatusResponse { success: true }))
}

/// GET /api/v1/presence/:user_id - Presence snapshot
///
/// Falls back to the user directory's last-seen when the registry has no
/// in-memory record (e.g. after a restart).
pub async fn get_presence(
    State(ctx): State<AppContext>,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceView>> {
    if let Some(view) = ctx.registry.presence(&user_id) {
        return Ok(Json(view));
    }

    let record = db::users::find_by_id(&ctx.db_pool, &user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))?;
    let now = Utc::now();
    Ok(Json(PresenceView {
        online: is_recent(record.last_seen, now),
        last_seen: record.last_seen,
        last_seen_label: last_seen_label(record.last_seen, now),
    }))
}
