pub mod events;
pub mod holder;
