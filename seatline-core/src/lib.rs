pub mod clock;
pub mod hold;
pub mod memory;
pub mod repository;
pub mod seat;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use hold::{CloseReason, HoldState, SeatHold};
pub use repository::{CloseOutcome, EventDirectory, EventSummary, SeatHoldRepository};
pub use seat::SeatName;
pub use service::{HoldPolicy, HoldService, MAX_HOLD_SECONDS};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Event {0} does not exist")]
    UnknownEvent(i64),
    #[error("Seat {seat_name} is unavailable")]
    SeatUnavailable { event_id: i64, seat_name: String },
    #[error("No hold on seat {seat_name} for this checkout")]
    HoldNotFound { event_id: i64, seat_name: String },
    #[error("Selection of seat {seat_name} expired, please reselect")]
    HoldExpired { event_id: i64, seat_name: String },
    #[error("Hold on seat {seat_name} is already closed ({reason})")]
    HoldClosed {
        event_id: i64,
        seat_name: String,
        reason: CloseReason,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
