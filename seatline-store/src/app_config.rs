use seatline_core::{CoreResult, HoldPolicy};
use serde::Deserialize;
use std::env;
use std::net::IpAddr;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    pub webhooks: WebhookConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub seat_hold_seconds: u64,
    #[serde(default = "default_min_hold")]
    pub min_seat_hold_seconds: u64,
    #[serde(default = "default_max_hold")]
    pub max_seat_hold_seconds: u64,
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: i64,
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_seconds: i64,
}

fn default_min_hold() -> u64 { 30 }
fn default_max_hold() -> u64 { 1800 }
fn default_rate_limit_requests() -> i64 { 100 }
fn default_rate_limit_window() -> i64 { 60 }

impl BusinessRules {
    /// Fails when the configured durations cannot produce a usable hold.
    pub fn hold_policy(&self) -> CoreResult<HoldPolicy> {
        HoldPolicy {
            default_ttl_seconds: self.seat_hold_seconds,
            min_ttl_seconds: self.min_seat_hold_seconds,
            max_ttl_seconds: self.max_seat_hold_seconds,
        }
        .check()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Reverse proxies whose `x-forwarded-for` is believed.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. SEATLINE__SERVER__PORT=8081
            .add_source(config::Environment::with_prefix("SEATLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
