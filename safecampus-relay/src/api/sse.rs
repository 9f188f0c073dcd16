//! Server-Sent Events live channel
//!
//! Each connection registers with the session registry, optionally joins
//! its rooms, and then filters the shared envelope stream against its own
//! registration. Dashboard connections receive the current actionable
//! report list as a one-shot `initial_reports` event before live updates
//! begin. Disconnects are observed via a drop guard, which unregisters the
//! connection and persists the offline side effect when it was the owning
//! user's last one.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use safecampus_common::events::{user_room, RelayEvent, DASHBOARD_ROOM};
use safecampus_common::model::Role;

use crate::api::AppContext;
use crate::db;
use crate::error::Result;
use crate::registry::{delivers_to, ConnectionRegistry};
use crate::router::BroadcastRouter;

#[derive(Debug, Deserialize)]
pub struct EventStreamParams {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// GET /api/v1/events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(params): Query<EventStreamParams>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let role = match params.role.as_deref() {
        Some(raw) => raw.parse::<Role>()?,
        None => Role::Mobile,
    };

    let connection_id = ctx.registry.register(role, params.user_id.clone());
    debug!(%connection_id, role = role.as_str(), "SSE client connected");

    // The guard exists before any fallible work so an early return still
    // unwinds the registration.
    let guard = ConnectionGuard {
        registry: Arc::clone(&ctx.registry),
        router: ctx.router.clone(),
        db: ctx.db_pool.clone(),
        connection_id,
    };

    match role {
        Role::Dashboard => {
            ctx.registry.join_room(connection_id, DASHBOARD_ROOM);
        }
        Role::Mobile => {
            if let Some(user) = &params.user_id {
                ctx.registry.join_room(connection_id, &user_room(user));
            }
        }
    }

    if let Some(user) = params.user_id.clone() {
        let db = ctx.db_pool.clone();
        tokio::spawn(async move {
            if let Err(e) = db::users::set_active(&db, &user, true).await {
                warn!(user_id = %user, error = %e, "failed to persist online status");
            }
        });
    }

    let (mobile, dashboard) = ctx.registry.counts();
    ctx.router.connection_counts(mobile, dashboard);

    // Dashboard join: snapshot of everything currently actionable, as a
    // distinct event, not the live-update event.
    let snapshot = if role == Role::Dashboard {
        let reports = ctx.pipeline.dashboard_snapshot().await?;
        Some(RelayEvent::InitialReports {
            count: reports.len(),
            reports,
        })
    } else {
        None
    };

    let registry = Arc::clone(&ctx.registry);
    let mut rx = ctx.state.bus.subscribe();

    let stream = async_stream::stream! {
        let _guard = guard;

        if let Some(event) = snapshot {
            if let Some(sse_event) = to_sse_event(Uuid::new_v4(), &event) {
                yield Ok::<_, Infallible>(sse_event);
            }
        }

        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    let conn = match registry.connection(connection_id) {
                        Some(conn) => conn,
                        None => break,
                    };
                    if !delivers_to(&conn, &envelope.audience) {
                        continue;
                    }
                    if let Some(sse_event) = to_sse_event(envelope.id, &envelope.event) {
                        yield Ok::<_, Infallible>(sse_event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Slow subscriber: events were dropped, not duplicated.
                    warn!(%connection_id, skipped, "SSE subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn to_sse_event(envelope_id: Uuid, event: &RelayEvent) -> Option<Event> {
    match Event::default()
        .id(envelope_id.to_string())
        .event(event.name())
        .json_data(event)
    {
        Ok(sse_event) => Some(sse_event),
        Err(e) => {
            warn!(event = event.name(), error = %e, "failed to serialize SSE event");
            None
        }
    }
}

/// Unregisters the connection when the SSE stream is dropped
///
/// When this was the owning user's last connection, the offline flag is
/// persisted out-of-band; the drop itself never blocks.
struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    router: BroadcastRouter,
    db: Pool<Sqlite>,
    connection_id: Uuid,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let outcome = self.registry.unregister(self.connection_id);
        debug!(connection_id = %self.connection_id, "SSE client disconnected");

        let (mobile, dashboard) = self.registry.counts();
        self.router.connection_counts(mobile, dashboard);

        if let Some(user_id) = outcome.user_went_offline {
            let db = self.db.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = db::users::set_active(&db, &user_id, false).await {
                        warn!(user_id = %user_id, error = %e, "failed to persist offline status");
                    }
                });
            }
        }
    }
}
