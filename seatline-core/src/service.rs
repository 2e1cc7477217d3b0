use chrono::{DateTime, Duration, Utc};
use seatline_shared::HolderInfo;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::hold::{CloseReason, HoldState, SeatHold};
use crate::repository::{
    ensure_holder_hold_active, AcquireOutcome, CloseOutcome, EventDirectory, EventSummary,
    NewHold, SeatHoldRepository,
};
use crate::seat::{validate_holder_code, SeatName};
use crate::{CoreError, CoreResult};

/// Upper bound on any hold, whatever the configuration says.
pub const MAX_HOLD_SECONDS: u64 = 86_400; // one day

/// TTL rules applied by the issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldPolicy {
    pub default_ttl_seconds: u64,
    pub min_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 600,
            min_ttl_seconds: 30,
            max_ttl_seconds: 1800,
        }
    }
}

impl HoldPolicy {
    /// Startup check: `0 < min <= default <= max <= MAX_HOLD_SECONDS`.
    pub fn check(self) -> CoreResult<Self> {
        if self.min_ttl_seconds == 0 {
            return Err(CoreError::ValidationError(
                "minimum hold duration must be positive".to_string(),
            ));
        }
        if self.min_ttl_seconds > self.max_ttl_seconds {
            return Err(CoreError::ValidationError(format!(
                "minimum hold duration {}s exceeds maximum {}s",
                self.min_ttl_seconds, self.max_ttl_seconds
            )));
        }
        if self.max_ttl_seconds > MAX_HOLD_SECONDS {
            return Err(CoreError::ValidationError(format!(
                "maximum hold duration {}s exceeds {}s",
                self.max_ttl_seconds, MAX_HOLD_SECONDS
            )));
        }
        if !(self.min_ttl_seconds..=self.max_ttl_seconds).contains(&self.default_ttl_seconds) {
            return Err(CoreError::ValidationError(format!(
                "default hold duration {}s is outside {}..={}s",
                self.default_ttl_seconds, self.min_ttl_seconds, self.max_ttl_seconds
            )));
        }
        Ok(self)
    }

    /// Requested or default TTL, clamped into `[min, max]`. Never zero.
    pub fn ttl(&self, requested: Option<u64>) -> Duration {
        let max = self.max_ttl_seconds.clamp(1, MAX_HOLD_SECONDS);
        let min = self.min_ttl_seconds.clamp(1, max);
        let secs = requested.unwrap_or(self.default_ttl_seconds).clamp(min, max);
        // secs <= MAX_HOLD_SECONDS, so the conversion cannot fail
        i64::try_from(secs)
            .map(Duration::seconds)
            .unwrap_or_else(|_| Duration::days(1))
    }
}

#[derive(Debug, Clone)]
pub struct IssueHold {
    pub event_id: i64,
    pub seat_name: String,
    pub code: String,
    pub user_info: HolderInfo,
    pub ttl_seconds: Option<u64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Hold issuer, validator and closer over a repository and a clock.
pub struct HoldService {
    holds: Arc<dyn SeatHoldRepository>,
    events: Arc<dyn EventDirectory>,
    clock: Arc<dyn Clock>,
    policy: HoldPolicy,
}

impl HoldService {
    pub fn new(
        holds: Arc<dyn SeatHoldRepository>,
        events: Arc<dyn EventDirectory>,
        clock: Arc<dyn Clock>,
        policy: HoldPolicy,
    ) -> Self {
        Self {
            holds,
            events,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> HoldPolicy {
        self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The event, or `UnknownEvent`.
    pub async fn event(&self, event_id: i64) -> CoreResult<EventSummary> {
        self.events
            .find_event(event_id)
            .await?
            .ok_or(CoreError::UnknownEvent(event_id))
    }

    fn parse_seats(seats: &[String]) -> CoreResult<Vec<SeatName>> {
        if seats.is_empty() {
            return Err(CoreError::ValidationError("no seats given".to_string()));
        }
        let mut parsed: Vec<SeatName> = Vec::with_capacity(seats.len());
        for raw in seats {
            let seat = SeatName::parse(raw)?;
            if !parsed.contains(&seat) {
                parsed.push(seat);
            }
        }
        Ok(parsed)
    }

    /// Creates a hold, or refreshes the caller's own active one.
    pub async fn issue(&self, req: IssueHold) -> CoreResult<AcquireOutcome> {
        let seat_name = SeatName::parse(&req.seat_name)?;
        validate_holder_code(&req.code)?;
        self.event(req.event_id).await?;

        let now = self.clock.now();
        let ttl = self.policy.ttl(req.ttl_seconds);
        let new_hold = NewHold {
            event_id: req.event_id,
            seat_name: seat_name.clone(),
            code: req.code,
            user_info: req.user_info,
            ttl,
            ip_address: req.ip_address,
            user_agent: req.user_agent,
        };

        match self.holds.acquire(new_hold, now).await {
            Ok(outcome) => {
                let hold = outcome.hold();
                info!(
                    event_id = hold.event_id,
                    seat = %hold.seat_name,
                    hold_id = %hold.id,
                    refreshed = outcome.is_refresh(),
                    holder = hold.user_info.kind(),
                    "Seat held until {}",
                    hold.expire_time
                );
                Ok(outcome)
            }
            Err(err @ CoreError::SeatUnavailable { .. }) => {
                info!(event_id = req.event_id, seat = %seat_name, "Seat hold refused: held by another checkout");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Re-checks at the payment boundary that every seat is still held by `code`.
    pub async fn validate(
        &self,
        event_id: i64,
        code: &str,
        seats: &[String],
    ) -> CoreResult<Vec<SeatHold>> {
        validate_holder_code(code)?;
        let seats = Self::parse_seats(seats)?;
        self.event(event_id).await?;

        let now = self.clock.now();
        let mut held = Vec::with_capacity(seats.len());
        for seat in &seats {
            let latest = self.holds.find_latest(event_id, seat, code).await?;
            if let Err(err) = ensure_holder_hold_active(event_id, seat, latest.as_ref(), now) {
                warn!(event_id, seat = %seat, "Hold validation failed: {}", err);
                return Err(err);
            }
            if let Some(hold) = latest {
                held.push(hold);
            }
        }
        Ok(held)
    }

    /// Validates and closes the holder's seats as purchased in one step.
    pub async fn complete_purchase(
        &self,
        event_id: i64,
        code: &str,
        seats: &[String],
    ) -> CoreResult<Vec<SeatHold>> {
        validate_holder_code(code)?;
        let seats = Self::parse_seats(seats)?;
        self.event(event_id).await?;

        let now = self.clock.now();
        let closed = self
            .holds
            .close_for_holder(event_id, code, &seats, CloseReason::Purchased, now)
            .await?;

        info!(event_id, seats = closed.len(), "Purchase completed, holds closed");
        Ok(closed)
    }

    /// Idempotent: an already-closed hold comes back unchanged.
    pub async fn close(&self, hold_id: Uuid, reason: CloseReason) -> CoreResult<CloseOutcome> {
        let now = self.clock.now();
        let outcome = self
            .holds
            .close(hold_id, reason, now)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("seat hold {}", hold_id)))?;

        let hold = outcome.hold();
        if outcome.changed() {
            info!(hold_id = %hold.id, event_id = hold.event_id, seat = %hold.seat_name, reason = %reason, "Seat hold closed");
        } else {
            debug!(hold_id = %hold.id, "Seat hold already closed");
        }
        Ok(outcome)
    }

    /// Holder gives the seat back. A hold that already lapsed answers
    /// `HoldExpired` and is left for the issuer to reclaim.
    pub async fn release(&self, event_id: i64, seat_name: &str, code: &str) -> CoreResult<CloseOutcome> {
        let seat = SeatName::parse(seat_name)?;
        validate_holder_code(code)?;

        let latest = self
            .holds
            .find_latest(event_id, &seat, code)
            .await?
            .ok_or_else(|| CoreError::HoldNotFound {
                event_id,
                seat_name: seat.to_string(),
            })?;

        match latest.state_at(self.clock.now()) {
            HoldState::Lapsed => Err(CoreError::HoldExpired {
                event_id,
                seat_name: seat.to_string(),
            }),
            HoldState::Closed(_) => Ok(CloseOutcome::AlreadyClosed(latest)),
            HoldState::Active => self.close(latest.id, CloseReason::Cancelled).await,
        }
    }

    pub async fn get(&self, hold_id: Uuid) -> CoreResult<SeatHold> {
        self.holds
            .get(hold_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("seat hold {}", hold_id)))
    }

    /// Holds that currently block their seat.
    pub async fn active_holds(&self, event_id: i64) -> CoreResult<Vec<SeatHold>> {
        self.event(event_id).await?;
        self.holds.list_active(event_id, self.clock.now()).await
    }
}
