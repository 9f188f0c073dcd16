//! HTTP/SSE API implementation for the relay
//!
//! REST endpoints for submissions and queries, plus the SSE live channel.
//! The error taxonomy maps onto status codes here: validation → 400,
//! not-found → 404, lockout → 429, everything downstream → 500 with the
//! detail kept out of the response body.

pub mod handlers;
pub mod sse;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use sqlx::{Pool, Sqlite};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::config::Config;
use crate::error::Error;
use crate::pipeline::AlertPipeline;
use crate::registry::ConnectionRegistry;
use crate::router::BroadcastRouter;
use crate::state::SharedState;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub pipeline: Arc<AlertPipeline>,
    pub registry: Arc<ConnectionRegistry>,
    pub state: Arc<SharedState>,
    pub router: BroadcastRouter,
    pub db_pool: Pool<Sqlite>,
    pub config: Arc<Config>,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(handlers::health))

        // API v1 routes
        .nest("/api/v1", Router::new()
            // Report intake and dashboard queries
            .route("/reports", post(handlers::submit_report))
            .route("/reports", get(handlers::list_reports))
            .route("/reports/:id", get(handlers::get_report))
            .route("/reports/:id/status", post(handlers::update_report_status))

            // Community feedback loop
            .route("/feedback", post(handlers::submit_feedback))

            // SOS lifecycle
            .route("/sos", post(handlers::raise_sos))
            .route("/sos", get(handlers::list_active_sos))
            .route("/sos/:id/location", post(handlers::sos_location))
            .route("/sos/:id/ack", post(handlers::acknowledge_sos))
            .route("/sos/:id/end", post(handlers::end_sos))

            // Friends and direct messages
            .route("/friends", post(handlers::add_friend))
            .route("/friends/:user_id", get(handlers::list_friends))
            .route("/messages", post(handlers::send_message))
            .route("/messages/read", post(handlers::mark_messages_read))
            .route("/messages/:user_id/:peer_id", get(handlers::conversation))

            // Verification codes
            .route("/verification/issue", post(handlers::issue_verification_code))
            .route("/verification/verify", post(handlers::verify_code))

            // User directory and presence
            .route("/users", post(handlers::upsert_user))
            .route("/presence/ping", post(handlers::presence_ping))
            .route("/presence/:user_id", get(handlers::get_presence))

            // SSE live channel
            .route("/events", get(sse::event_stream))
        )
        .with_state(ctx)

        // Enable CORS for the dashboard and mobile clients
        .layer(CorsLayer::permissive())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::Lockout(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
            Error::Database(_)
            | Error::Config(_)
            | Error::Http(_)
            | Error::Classifier(_)
            | Error::Internal(_) => {
                error!("request failed: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
