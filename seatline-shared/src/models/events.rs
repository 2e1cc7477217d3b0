use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatHoldEventKind {
    Held,
    Refreshed,
    Released,
    Sold,
}

impl SeatHoldEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatHoldEventKind::Held => "held",
            SeatHoldEventKind::Refreshed => "refreshed",
            SeatHoldEventKind::Released => "released",
            SeatHoldEventKind::Sold => "sold",
        }
    }
}

/// Broadcast whenever the availability of a seat changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatHoldEvent {
    pub kind: SeatHoldEventKind,
    pub event_id: i64,
    pub seat_name: String,
    pub hold_id: Uuid,
    /// Set for `held`/`refreshed`; the seat frees itself at this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub timestamp: i64,
}
