//! Shared relay state
//!
//! Process-wide caches with an explicit lifecycle: created once at startup,
//! injected into the components that need them, cleared on shutdown. Only
//! the lifecycle controller mutates the caches; everything else reads.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use safecampus_common::events::EventBus;
use safecampus_common::model::{Report, SosAck, SosEvent, SosStatus};

/// Shared state accessible by all components
pub struct SharedState {
    /// Recently active reports, by id. A working set for broadcast
    /// payloads and health statistics; the store remains authoritative.
    alerts: RwLock<HashMap<Uuid, Report>>,

    /// Live SOS events, by id. This cache IS the source of truth for SOS
    /// bookkeeping; nothing SOS-related touches the store.
    sos: RwLock<HashMap<Uuid, SosEvent>>,

    /// Event broadcaster for the live channel
    pub bus: EventBus,
}

impl SharedState {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            alerts: RwLock::new(HashMap::new()),
            sos: RwLock::new(HashMap::new()),
            bus: EventBus::new(event_capacity),
        }
    }

    // ------------------------------------------------------------------
    // Alerts cache
    // ------------------------------------------------------------------

    pub async fn cache_report(&self, report: Report) {
        self.alerts.write().await.insert(report.id, report);
    }

    pub async fn cached_report(&self, id: Uuid) -> Option<Report> {
        self.alerts.read().await.get(&id).cloned()
    }

    /// Remove a report from the working set (terminal transition)
    pub async fn evict_report(&self, id: Uuid) -> Option<Report> {
        self.alerts.write().await.remove(&id)
    }

    pub async fn active_alert_count(&self) -> usize {
        self.alerts.read().await.len()
    }

    // ------------------------------------------------------------------
    // SOS cache
    // ------------------------------------------------------------------

    pub async fn insert_sos(&self, sos: SosEvent) {
        self.sos.write().await.insert(sos.id, sos);
    }

    pub async fn sos(&self, id: Uuid) -> Option<SosEvent> {
        self.sos.read().await.get(&id).cloned()
    }

    /// All SOS events still active, newest first
    pub async fn active_sos(&self) -> Vec<SosEvent> {
        let mut list: Vec<SosEvent> = self
            .sos
            .read()
            .await
            .values()
            .filter(|s| s.status == SosStatus::Active)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.raised_at.cmp(&a.raised_at));
        list
    }

    /// Update an SOS location in place; None when the id is unknown
    pub async fn update_sos_location(&self, id: Uuid, latitude: f64, longitude: f64) -> Option<SosEvent> {
        let mut sos = self.sos.write().await;
        let entry = sos.get_mut(&id)?;
        entry.location.latitude = latitude;
        entry.location.longitude = longitude;
        Some(entry.clone())
    }

    /// Record an acknowledgment; a repeat ack by the same friend refreshes
    /// the timestamp rather than appending a second entry. None when the id
    /// is unknown.
    pub async fn acknowledge_sos(&self, id: Uuid, ack: SosAck) -> Option<SosEvent> {
        let mut sos = self.sos.write().await;
        let entry = sos.get_mut(&id)?;
        match entry
            .acknowledgments
            .iter_mut()
            .find(|a| a.friend_id == ack.friend_id)
        {
            Some(existing) => existing.acknowledged_at = ack.acknowledged_at,
            None => entry.acknowledgments.push(ack),
        }
        Some(entry.clone())
    }

    /// Terminal SOS transition: evicts the event and all of its
    /// acknowledgment bookkeeping. None when the id is unknown.
    pub async fn end_sos(&self, id: Uuid) -> Option<SosEvent> {
        let mut removed = self.sos.write().await.remove(&id)?;
        removed.status = SosStatus::Ended;
        removed.acknowledgments.clear();
        Some(removed)
    }

    /// Drop all cached state (shutdown path)
    pub async fn clear(&self) {
        self.alerts.write().await.clear();
        self.sos.write().await.clear();
    }
}
