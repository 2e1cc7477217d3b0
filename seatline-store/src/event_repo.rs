use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seatline_core::{CoreResult, EventDirectory, EventSummary};
use sqlx::PgPool;

use crate::hold_repo::storage_error;

pub struct PgEventDirectory {
    pool: PgPool,
}

impl PgEventDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    name: String,
    starts_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl EventDirectory for PgEventDirectory {
    async fn find_event(&self, event_id: i64) -> CoreResult<Option<EventSummary>> {
        let row = sqlx::query_as::<_, EventRow>("SELECT id, name, starts_at FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(|r| EventSummary {
            id: r.id,
            name: r.name,
            starts_at: r.starts_at,
        }))
    }
}
