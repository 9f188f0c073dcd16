//! Session/connection registry
//!
//! Tracks live connections, their role, room memberships, and per-user
//! presence. Presence is reference-counted: a user goes offline when their
//! last live connection unregisters, not on any single disconnect, so a
//! phone with two open sockets surviving one drop stays online.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use safecampus_common::events::{user_room, Audience, DASHBOARD_ROOM};
use safecampus_common::model::Role;
use safecampus_common::relative_time::{is_recent, last_seen_label};

/// One live transport connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: Uuid,
    pub role: Role,
    pub user_id: Option<String>,
    pub rooms: HashSet<String>,
    pub connected_at: DateTime<Utc>,
}

/// Per-user presence bookkeeping
#[derive(Debug, Clone)]
struct Presence {
    connection_count: usize,
    last_activity: DateTime<Utc>,
}

/// Rendered presence for API responses
#[derive(Debug, Clone, serde::Serialize)]
pub struct PresenceView {
    pub online: bool,
    pub last_seen: DateTime<Utc>,
    pub last_seen_label: String,
}

/// What happened to the owning user when a connection went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnregisterOutcome {
    /// Set when this was the user's last live connection
    pub user_went_offline: Option<String>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<Uuid, Connection>,
    presence: HashMap<String, Presence>,
}

/// Registry of live connections and user presence
///
/// All operations take one short-lived lock; none of them block on I/O, so
/// the registry is safe to touch from synchronous contexts (including drop
/// guards on the SSE path).
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection, bumping the owning user's presence
    pub fn register(&self, role: Role, user_id: Option<String>) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("registry lock poisoned");

        if let Some(user) = &user_id {
            let presence = inner.presence.entry(user.clone()).or_insert(Presence {
                connection_count: 0,
                last_activity: now,
            });
            presence.connection_count += 1;
            presence.last_activity = now;
        }

        inner.connections.insert(
            id,
            Connection {
                id,
                role,
                user_id,
                rooms: HashSet::new(),
                connected_at: now,
            },
        );
        id
    }

    /// Join a named room; false when the connection is unknown
    pub fn join_room(&self, connection_id: Uuid, room: &str) -> bool {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        match inner.connections.get_mut(&connection_id) {
            Some(conn) => {
                conn.rooms.insert(room.to_string());
                true
            }
            None => false,
        }
    }

    /// Record user activity (message sent, location ping, etc.)
    pub fn touch(&self, user_id: &str) {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let presence = inner.presence.entry(user_id.to_string()).or_insert(Presence {
            connection_count: 0,
            last_activity: now,
        });
        presence.last_activity = now;
    }

    /// Remove a connection; reports whether the owning user went offline
    pub fn unregister(&self, connection_id: Uuid) -> UnregisterOutcome {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let removed = inner.connections.remove(&connection_id);

        let mut outcome = UnregisterOutcome {
            user_went_offline: None,
        };
        if let Some(conn) = removed {
            if let Some(user) = conn.user_id {
                if let Some(presence) = inner.presence.get_mut(&user) {
                    presence.connection_count = presence.connection_count.saturating_sub(1);
                    presence.last_activity = Utc::now();
                    if presence.connection_count == 0 {
                        outcome.user_went_offline = Some(user);
                    }
                }
            }
        }
        outcome
    }

    pub fn connection(&self, connection_id: Uuid) -> Option<Connection> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.connections.get(&connection_id).cloned()
    }

    /// Live connection counts by role: (mobile, dashboard)
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock().expect("registry lock poisoned");
        let mobile = inner
            .connections
            .values()
            .filter(|c| c.role == Role::Mobile)
            .count();
        (mobile, inner.connections.len() - mobile)
    }

    /// Presence snapshot for one user; None when the user was never seen
    pub fn presence(&self, user_id: &str) -> Option<PresenceView> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        let presence = inner.presence.get(user_id)?;
        let now = Utc::now();
        Some(PresenceView {
            online: is_recent(presence.last_activity, now),
            last_seen: presence.last_activity,
            last_seen_label: last_seen_label(presence.last_activity, now),
        })
    }
}

/// Whether an envelope addressed to `audience` reaches this connection
///
/// Matches on role/user identity as well as explicit room membership;
/// the redundancy is deliberate so a connection that missed a room join
/// after a reconnect still receives its traffic.
pub fn delivers_to(conn: &Connection, audience: &Audience) -> bool {
    match audience {
        Audience::All => true,
        Audience::Role(role) => {
            conn.role == *role
                || (*role == Role::Dashboard && conn.rooms.contains(DASHBOARD_ROOM))
        }
        Audience::User(user_id) => {
            conn.user_id.as_deref() == Some(user_id.as_str())
                || conn.rooms.contains(&user_room(user_id))
        }
    }
}
