pub mod models;
pub mod pii;

pub use models::events::{SeatHoldEvent, SeatHoldEventKind};
pub use models::holder::HolderInfo;
pub use pii::Masked;
