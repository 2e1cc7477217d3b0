pub mod auth;
pub mod client;
pub mod rate_limit;

pub use auth::{admin_auth_middleware, customer_auth_middleware, AdminClaims, CustomerClaims};
pub use client::ClientMeta;
pub use rate_limit::rate_limit_middleware;
