use std::net::IpAddr;
use std::sync::Arc;
use seatline_core::HoldService;
use seatline_shared::SeatHoldEvent;
use seatline_store::RedisClient;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct RateLimitConfig {
    pub requests: i64,
    pub window_seconds: i64,
    /// Peers allowed to name the client via `x-forwarded-for`.
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Clone)]
pub struct AppState {
    pub holds: Arc<HoldService>,
    /// Rate limiting is off when unset.
    pub redis: Option<Arc<RedisClient>>,
    pub hold_tx: broadcast::Sender<SeatHoldEvent>,
    pub auth: AuthConfig,
    pub webhook_secret: String,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    /// Fire-and-forget; no subscribers is fine.
    pub fn publish(&self, event: SeatHoldEvent) {
        let _ = self.hold_tx.send(event);
    }
}
