//! Append-only event log.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pipeline_core::{DeliveryAnnotation, Error, Event, EventKind, Result, TenantId};
use uuid::Uuid;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: Event) -> Result<()>;

    /// Events of `kind` with `from <= timestamp < to`, oldest first.
    async fn list(
        &self,
        tenant: &TenantId,
        kind: EventKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// The first `apply_completed` matching a started event, if any.
    async fn find_completion(&self, started: &Event) -> Result<Option<Event>>;

    /// The derived event for `origin`, if one was emitted.
    async fn derived_for(&self, tenant: &TenantId, origin: Uuid) -> Result<Option<Event>>;

    /// Append a derived event unless one already exists for its origin.
    /// Returns the stored event and whether it was newly appended.
    async fn append_derived_once(&self, event: Event) -> Result<(Event, bool)>;

    /// Derived events whose delivery annotation is missing or not final.
    async fn pending_deliveries(&self, tenant: &TenantId, max_attempts: u32) -> Result<Vec<Event>>;

    /// Record a delivery attempt. A final annotation is never overwritten;
    /// returns whether the annotation changed.
    async fn annotate_delivery(
        &self,
        tenant: &TenantId,
        event_id: Uuid,
        annotation: DeliveryAnnotation,
        max_attempts: u32,
    ) -> Result<bool>;
}

#[derive(Debug, Default)]
struct EventLog {
    events: Vec<Event>,
    by_id: HashMap<Uuid, usize>,
    derived_by_origin: HashMap<(TenantId, Uuid), usize>,
}

impl EventLog {
    fn push(&mut self, event: Event) -> usize {
        let idx = self.events.len();
        self.by_id.insert(event.id, idx);
        if let Some(origin) = event.origin_event_id() {
            self.derived_by_origin.insert((event.tenant_id.clone(), origin), idx);
        }
        self.events.push(event);
        idx
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<EventLog>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: Event) -> Result<()> {
        let mut log = self.log.write();
        if log.by_id.contains_key(&event.id) {
            return Err(Error::store(format!("event {} already appended", event.id)));
        }
        log.push(event);
        Ok(())
    }

    async fn list(
        &self,
        tenant: &TenantId,
        kind: EventKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let log = self.log.read();
        let mut events: Vec<_> = log
            .events
            .iter()
            .filter(|e| &e.tenant_id == tenant && e.kind == kind && e.timestamp >= from && e.timestamp < to)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn find_completion(&self, started: &Event) -> Result<Option<Event>> {
        let log = self.log.read();
        Ok(log
            .events
            .iter()
            .filter(|e| started.is_completed_by(e))
            .min_by_key(|e| e.timestamp)
            .cloned())
    }

    async fn derived_for(&self, tenant: &TenantId, origin: Uuid) -> Result<Option<Event>> {
        let log = self.log.read();
        Ok(log
            .derived_by_origin
            .get(&(tenant.clone(), origin))
            .map(|&idx| log.events[idx].clone()))
    }

    async fn append_derived_once(&self, event: Event) -> Result<(Event, bool)> {
        let origin = event
            .origin_event_id()
            .ok_or_else(|| Error::validation("derived event without an origin"))?;

        // Check and insert under one write lock.
        let mut log = self.log.write();
        if let Some(&idx) = log.derived_by_origin.get(&(event.tenant_id.clone(), origin)) {
            return Ok((log.events[idx].clone(), false));
        }
        log.push(event.clone());
        Ok((event, true))
    }

    async fn pending_deliveries(&self, tenant: &TenantId, max_attempts: u32) -> Result<Vec<Event>> {
        let log = self.log.read();
        let mut pending: Vec<_> = log
            .derived_by_origin
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, &idx)| &log.events[idx])
            .filter(|e| e.delivery.as_ref().map_or(true, |d| !d.is_final(max_attempts)))
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.timestamp);
        Ok(pending)
    }

    async fn annotate_delivery(
        &self,
        tenant: &TenantId,
        event_id: Uuid,
        annotation: DeliveryAnnotation,
        max_attempts: u32,
    ) -> Result<bool> {
        let mut log = self.log.write();
        let idx = *log
            .by_id
            .get(&event_id)
            .ok_or_else(|| Error::not_found("event", event_id))?;
        let event = &mut log.events[idx];
        if &event.tenant_id != tenant {
            return Err(Error::not_found("event", event_id));
        }
        if event.kind != EventKind::RetargetTriggered {
            return Err(Error::InvalidTransition(format!(
                "only derived events carry delivery annotations, {} is {}",
                event.id, event.kind
            )));
        }
        if let Some(current) = &event.delivery {
            if current.is_final(max_attempts) || *current == annotation {
                return Ok(false);
            }
        }
        event.delivery = Some(annotation);
        Ok(true)
    }
}
