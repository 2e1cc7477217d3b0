//! Storage seams for holds and the events they belong to.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use seatline_shared::HolderInfo;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hold::{CloseReason, HoldState, SeatHold};
use crate::seat::SeatName;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct NewHold {
    pub event_id: i64,
    pub seat_name: SeatName,
    pub code: String,
    pub user_info: HolderInfo,
    pub ttl: Duration,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    Created(SeatHold),
    /// Same holder asked again while still active; only `expire_time` and
    /// the snapshot moved.
    Refreshed(SeatHold),
}

impl AcquireOutcome {
    pub fn hold(&self) -> &SeatHold {
        match self {
            AcquireOutcome::Created(h) | AcquireOutcome::Refreshed(h) => h,
        }
    }

    pub fn into_hold(self) -> SeatHold {
        match self {
            AcquireOutcome::Created(h) | AcquireOutcome::Refreshed(h) => h,
        }
    }

    pub fn is_refresh(&self) -> bool {
        matches!(self, AcquireOutcome::Refreshed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    Closed(SeatHold),
    /// Closed earlier; the stored row is returned untouched.
    AlreadyClosed(SeatHold),
}

impl CloseOutcome {
    pub fn hold(&self) -> &SeatHold {
        match self {
            CloseOutcome::Closed(h) | CloseOutcome::AlreadyClosed(h) => h,
        }
    }

    pub fn into_hold(self) -> SeatHold {
        match self {
            CloseOutcome::Closed(h) | CloseOutcome::AlreadyClosed(h) => h,
        }
    }

    /// True when this call set `closed_at`.
    pub fn changed(&self) -> bool {
        matches!(self, CloseOutcome::Closed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: i64,
    pub name: String,
    pub starts_at: Option<DateTime<Utc>>,
}

/// Repository for seat holds.
///
/// Implementations must make `acquire` and `close_for_holder` atomic: no
/// interleaving of calls may leave two active holds on one
/// `(event_id, seat_name)`, and a lapsed hold must never be closed as
/// purchased.
#[async_trait]
pub trait SeatHoldRepository: Send + Sync {
    /// Creates a hold, or refreshes the caller's own active hold.
    /// Fails with `SeatUnavailable` when another code holds the seat.
    async fn acquire(&self, hold: NewHold, now: DateTime<Utc>) -> CoreResult<AcquireOutcome>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<SeatHold>>;

    /// Most recent hold of `code` on the seat, whatever its state.
    async fn find_latest(
        &self,
        event_id: i64,
        seat_name: &SeatName,
        code: &str,
    ) -> CoreResult<Option<SeatHold>>;

    async fn list_active(&self, event_id: i64, now: DateTime<Utc>) -> CoreResult<Vec<SeatHold>>;

    /// Sets `closed_at`/`close_reason` if still unset. `None` means no such
    /// hold.
    async fn close(
        &self,
        id: Uuid,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<CloseOutcome>>;

    /// Closes the holder's active holds on every listed seat, or none of
    /// them if any seat fails `ensure_holder_hold_active`.
    async fn close_for_holder(
        &self,
        event_id: i64,
        code: &str,
        seats: &[SeatName],
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<SeatHold>>;
}

#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn find_event(&self, event_id: i64) -> CoreResult<Option<EventSummary>>;
}

/// Maps the holder's latest hold on a seat to the checkout outcome.
pub fn ensure_holder_hold_active(
    event_id: i64,
    seat_name: &SeatName,
    latest: Option<&SeatHold>,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    let hold = latest.ok_or_else(|| CoreError::HoldNotFound {
        event_id,
        seat_name: seat_name.to_string(),
    })?;

    match hold.state_at(now) {
        HoldState::Active => Ok(()),
        HoldState::Lapsed => Err(CoreError::HoldExpired {
            event_id,
            seat_name: seat_name.to_string(),
        }),
        HoldState::Closed(reason) => Err(CoreError::HoldClosed {
            event_id,
            seat_name: seat_name.to_string(),
            reason,
        }),
    }
}
