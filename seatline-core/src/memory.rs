//! In-process store with the same atomicity as the PostgreSQL one.
//! Used by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::hold::{CloseReason, SeatHold};
use crate::repository::{
    ensure_holder_hold_active, AcquireOutcome, CloseOutcome, EventDirectory, EventSummary, NewHold,
    SeatHoldRepository,
};
use crate::seat::SeatName;
use crate::{CoreError, CoreResult};

#[derive(Default)]
pub struct InMemorySeatHoldRepository {
    holds: Mutex<Vec<SeatHold>>,
}

impl InMemorySeatHoldRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, Vec<SeatHold>>> {
        self.holds
            .lock()
            .map_err(|_| CoreError::StorageError("hold store mutex poisoned".to_string()))
    }

    /// Every row ever written, lapsed and closed ones included.
    pub fn snapshot(&self) -> Vec<SeatHold> {
        self.holds
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

fn latest_for<'a>(
    holds: &'a [SeatHold],
    event_id: i64,
    seat_name: &str,
    code: &str,
) -> Option<&'a SeatHold> {
    holds
        .iter()
        .filter(|h| h.event_id == event_id && h.seat_name == seat_name && h.code == code)
        // Same ordering as the Postgres store: open rows win ties.
        .max_by_key(|h| (h.created_at, h.closed_at.is_none(), h.closed_at, h.updated_at, h.id))
}

#[async_trait]
impl SeatHoldRepository for InMemorySeatHoldRepository {
    async fn acquire(&self, req: NewHold, now: DateTime<Utc>) -> CoreResult<AcquireOutcome> {
        let mut holds = self.lock()?;
        let seat = req.seat_name.as_str();

        let open = holds.iter_mut().find(|h| {
            h.event_id == req.event_id && h.seat_name == seat && h.closed_at.is_none()
        });

        if let Some(existing) = open {
            if existing.expire_time > now {
                if existing.code != req.code {
                    return Err(CoreError::SeatUnavailable {
                        event_id: req.event_id,
                        seat_name: seat.to_string(),
                    });
                }
                existing.expire_time = now + req.ttl;
                existing.user_info = req.user_info;
                existing.ip_address = req.ip_address;
                existing.user_agent = req.user_agent;
                existing.updated_at = now;
                return Ok(AcquireOutcome::Refreshed(existing.clone()));
            }

            existing.closed_at = Some(existing.expire_time);
            existing.close_reason = Some(CloseReason::Lapsed);
            existing.updated_at = now;
        }

        let hold = SeatHold {
            id: Uuid::new_v4(),
            event_id: req.event_id,
            seat_name: seat.to_string(),
            code: req.code,
            user_info: req.user_info,
            closed_at: None,
            close_reason: None,
            expire_time: now + req.ttl,
            ip_address: req.ip_address,
            user_agent: req.user_agent,
            created_at: now,
            updated_at: now,
        };
        holds.push(hold.clone());
        Ok(AcquireOutcome::Created(hold))
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<SeatHold>> {
        Ok(self.lock()?.iter().find(|h| h.id == id).cloned())
    }

    async fn find_latest(
        &self,
        event_id: i64,
        seat_name: &SeatName,
        code: &str,
    ) -> CoreResult<Option<SeatHold>> {
        let holds = self.lock()?;
        Ok(latest_for(&holds, event_id, seat_name.as_str(), code).cloned())
    }

    async fn list_active(&self, event_id: i64, now: DateTime<Utc>) -> CoreResult<Vec<SeatHold>> {
        let holds = self.lock()?;
        let mut active: Vec<SeatHold> = holds
            .iter()
            .filter(|h| h.event_id == event_id && h.is_active_at(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| a.seat_name.cmp(&b.seat_name));
        Ok(active)
    }

    async fn close(
        &self,
        id: Uuid,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<CloseOutcome>> {
        let mut holds = self.lock()?;
        let Some(hold) = holds.iter_mut().find(|h| h.id == id) else {
            return Ok(None);
        };
        if hold.closed_at.is_some() {
            return Ok(Some(CloseOutcome::AlreadyClosed(hold.clone())));
        }
        hold.closed_at = Some(now);
        hold.close_reason = Some(reason);
        hold.updated_at = now;
        Ok(Some(CloseOutcome::Closed(hold.clone())))
    }

    async fn close_for_holder(
        &self,
        event_id: i64,
        code: &str,
        seats: &[SeatName],
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<SeatHold>> {
        let mut holds = self.lock()?;

        let mut ids = Vec::with_capacity(seats.len());
        for seat in seats {
            let latest = latest_for(&holds, event_id, seat.as_str(), code);
            ensure_holder_hold_active(event_id, seat, latest, now)?;
            if let Some(h) = latest {
                ids.push(h.id);
            }
        }

        let mut closed = Vec::with_capacity(ids.len());
        for hold in holds.iter_mut().filter(|h| ids.contains(&h.id)) {
            hold.closed_at = Some(now);
            hold.close_reason = Some(reason);
            hold.updated_at = now;
            closed.push(hold.clone());
        }
        Ok(closed)
    }
}

#[derive(Default)]
pub struct InMemoryEventDirectory {
    events: Mutex<HashMap<i64, EventSummary>>,
}

impl InMemoryEventDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = EventSummary>) -> Self {
        Self {
            events: Mutex::new(events.into_iter().map(|e| (e.id, e)).collect()),
        }
    }

    pub fn insert(&self, event: EventSummary) {
        if let Ok(mut events) = self.events.lock() {
            events.insert(event.id, event);
        }
    }
}

#[async_trait]
impl EventDirectory for InMemoryEventDirectory {
    async fn find_event(&self, event_id: i64) -> CoreResult<Option<EventSummary>> {
        let events = self
            .events
            .lock()
            .map_err(|_| CoreError::StorageError("event directory mutex poisoned".to_string()))?;
        Ok(events.get(&event_id).cloned())
    }
}
