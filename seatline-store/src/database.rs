use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use serde_json::Value;

use crate::app_config::{BusinessRules, DatabaseConfig};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays rows of `business_rules` (`{"value": ...}`) on the file config.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        Ok(apply_rule_overrides(defaults, rows))
    }
}

pub(crate) fn apply_rule_overrides(defaults: BusinessRules, rows: Vec<(String, Value)>) -> BusinessRules {
    let mut rules = defaults;

    for (key, value) in rows {
        let Some(v) = value.get("value") else { continue };
        match key.as_str() {
            "seat_hold_seconds" => {
                if let Some(u) = v.as_u64() {
                    rules.seat_hold_seconds = u;
                }
            }
            "min_seat_hold_seconds" => {
                if let Some(u) = v.as_u64() {
                    rules.min_seat_hold_seconds = u;
                }
            }
            "max_seat_hold_seconds" => {
                if let Some(u) = v.as_u64() {
                    rules.max_seat_hold_seconds = u;
                }
            }
            "rate_limit_requests" => {
                if let Some(i) = v.as_i64() {
                    rules.rate_limit_requests = i;
                }
            }
            _ => {}
        }
    }

    rules
}
