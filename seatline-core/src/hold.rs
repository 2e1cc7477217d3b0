use chrono::{DateTime, Utc};
use seatline_shared::HolderInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Payment captured, the seat became a ticket.
    Purchased,
    /// Holder released the seat.
    Cancelled,
    /// Back-office override.
    Admin,
    /// Reclaimed after `expire_time` passed so the seat could be held again.
    Lapsed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Purchased => "purchased",
            CloseReason::Cancelled => "cancelled",
            CloseReason::Admin => "admin",
            CloseReason::Lapsed => "lapsed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloseReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchased" => Ok(CloseReason::Purchased),
            "cancelled" => Ok(CloseReason::Cancelled),
            "admin" => Ok(CloseReason::Admin),
            "lapsed" => Ok(CloseReason::Lapsed),
            other => Err(CoreError::ValidationError(format!(
                "unknown close reason '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum HoldState {
    Active,
    Lapsed,
    Closed(CloseReason),
}

/// Temporary claim of one seat by one checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatHold {
    pub id: Uuid,
    pub event_id: i64,
    pub seat_name: String,
    pub code: String,
    pub user_info: HolderInfo,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
    pub expire_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SeatHold {
    /// `closed_at IS NULL AND expire_time > now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.closed_at.is_none() && self.expire_time > now
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> HoldState {
        match (self.closed_at, self.close_reason) {
            (Some(_), Some(CloseReason::Lapsed)) => HoldState::Lapsed,
            (Some(_), Some(reason)) => HoldState::Closed(reason),
            // Rows written by hand without a reason count as admin closures.
            (Some(_), None) => HoldState::Closed(CloseReason::Admin),
            (None, _) if self.expire_time > now => HoldState::Active,
            (None, _) => HoldState::Lapsed,
        }
    }

    /// Seconds until lapse, zero once lapsed or closed.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_active_at(now) {
            return 0;
        }
        (self.expire_time - now).num_seconds().max(0)
    }
}
