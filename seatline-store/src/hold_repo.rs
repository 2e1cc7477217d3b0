use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seatline_core::hold::{CloseReason, SeatHold};
use seatline_core::repository::{
    ensure_holder_hold_active, AcquireOutcome, CloseOutcome, NewHold, SeatHoldRepository,
};
use seatline_core::{CoreError, CoreResult, SeatName};
use seatline_shared::HolderInfo;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

const HOLD_COLUMNS: &str = "id, event_id, seat_name, code, user_info, closed_at, close_reason, \
     expire_time, ip_address, user_agent, created_at, updated_at";

/// Newest hold first. On equal `created_at` an open row beats a closed one,
/// then the later update, then `id` so the pick is stable.
const LATEST_FIRST: &str = "created_at DESC, closed_at DESC NULLS FIRST, updated_at DESC, id DESC";

/// Seat holds in PostgreSQL.
///
/// One-active-hold-per-seat is backed by the partial unique index
/// `seat_holds_one_active (event_id, seat_name) WHERE closed_at IS NULL`.
pub struct PgSeatHoldRepository {
    pool: PgPool,
}

impl PgSeatHoldRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SeatHoldRow {
    id: Uuid,
    event_id: i64,
    seat_name: String,
    code: String,
    user_info: Json<HolderInfo>,
    closed_at: Option<DateTime<Utc>>,
    close_reason: Option<String>,
    expire_time: DateTime<Utc>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AcquiredRow {
    #[sqlx(flatten)]
    hold: SeatHoldRow,
    inserted: bool,
}

impl TryFrom<SeatHoldRow> for SeatHold {
    type Error = CoreError;

    fn try_from(row: SeatHoldRow) -> Result<Self, Self::Error> {
        let close_reason = row
            .close_reason
            .as_deref()
            .map(str::parse::<CloseReason>)
            .transpose()?;

        Ok(SeatHold {
            id: row.id,
            event_id: row.event_id,
            seat_name: row.seat_name,
            code: row.code,
            user_info: row.user_info.0,
            closed_at: row.closed_at,
            close_reason,
            expire_time: row.expire_time,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn storage_error(e: sqlx::Error) -> CoreError {
    error!("Database error: {}", e);
    CoreError::StorageError(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl SeatHoldRepository for PgSeatHoldRepository {
    async fn acquire(&self, req: NewHold, now: DateTime<Utc>) -> CoreResult<AcquireOutcome> {
        let seat = req.seat_name.as_str();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // Lapsed rows still sit in the partial index until closed.
        sqlx::query(
            "UPDATE seat_holds SET closed_at = expire_time, close_reason = 'lapsed', updated_at = $3 \
             WHERE event_id = $1 AND seat_name = $2 AND closed_at IS NULL AND expire_time <= $3",
        )
        .bind(req.event_id)
        .bind(seat)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        let sql = format!(
            "INSERT INTO seat_holds \
                (id, event_id, seat_name, code, user_info, expire_time, ip_address, user_agent, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             ON CONFLICT (event_id, seat_name) WHERE closed_at IS NULL DO UPDATE SET \
                expire_time = EXCLUDED.expire_time, \
                user_info = EXCLUDED.user_info, \
                ip_address = EXCLUDED.ip_address, \
                user_agent = EXCLUDED.user_agent, \
                updated_at = EXCLUDED.updated_at \
             WHERE seat_holds.code = EXCLUDED.code AND seat_holds.expire_time > EXCLUDED.updated_at \
             RETURNING {HOLD_COLUMNS}, (xmax = 0) AS inserted"
        );

        let result = sqlx::query_as::<_, AcquiredRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.event_id)
            .bind(seat)
            .bind(&req.code)
            .bind(Json(&req.user_info))
            .bind(now + req.ttl)
            .bind(req.ip_address.as_deref())
            .bind(req.user_agent.as_deref())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await;

        let unavailable = || CoreError::SeatUnavailable {
            event_id: req.event_id,
            seat_name: seat.to_string(),
        };

        match result {
            Ok(Some(row)) => {
                tx.commit().await.map_err(storage_error)?;
                let inserted = row.inserted;
                let hold = SeatHold::try_from(row.hold)?;
                Ok(if inserted {
                    AcquireOutcome::Created(hold)
                } else {
                    AcquireOutcome::Refreshed(hold)
                })
            }
            // Held by another code: the conditional DO UPDATE matched nothing.
            Ok(None) => Err(unavailable()),
            Err(e) if is_unique_violation(&e) => Err(unavailable()),
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<SeatHold>> {
        let sql = format!("SELECT {HOLD_COLUMNS} FROM seat_holds WHERE id = $1");
        sqlx::query_as::<_, SeatHoldRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(SeatHold::try_from)
            .transpose()
    }

    async fn find_latest(
        &self,
        event_id: i64,
        seat_name: &SeatName,
        code: &str,
    ) -> CoreResult<Option<SeatHold>> {
        let sql = format!(
            "SELECT {HOLD_COLUMNS} FROM seat_holds \
             WHERE event_id = $1 AND seat_name = $2 AND code = $3 \
             ORDER BY {LATEST_FIRST} LIMIT 1"
        );
        sqlx::query_as::<_, SeatHoldRow>(&sql)
            .bind(event_id)
            .bind(seat_name.as_str())
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(SeatHold::try_from)
            .transpose()
    }

    async fn list_active(&self, event_id: i64, now: DateTime<Utc>) -> CoreResult<Vec<SeatHold>> {
        let sql = format!(
            "SELECT {HOLD_COLUMNS} FROM seat_holds \
             WHERE event_id = $1 AND closed_at IS NULL AND expire_time > $2 \
             ORDER BY seat_name"
        );
        sqlx::query_as::<_, SeatHoldRow>(&sql)
            .bind(event_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(SeatHold::try_from)
            .collect()
    }

    async fn close(
        &self,
        id: Uuid,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<CloseOutcome>> {
        let sql = format!(
            "UPDATE seat_holds SET closed_at = $2, close_reason = $3, updated_at = $2 \
             WHERE id = $1 AND closed_at IS NULL \
             RETURNING {HOLD_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, SeatHoldRow>(&sql)
            .bind(id)
            .bind(now)
            .bind(reason.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match updated {
            Some(row) => Ok(Some(CloseOutcome::Closed(SeatHold::try_from(row)?))),
            // Already closed (or unknown): report what is stored.
            None => Ok(self.get(id).await?.map(CloseOutcome::AlreadyClosed)),
        }
    }

    async fn close_for_holder(
        &self,
        event_id: i64,
        code: &str,
        seats: &[SeatName],
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<SeatHold>> {
        let seat_names: Vec<String> = seats.iter().map(|s| s.as_str().to_string()).collect();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let sql = format!(
            "SELECT {HOLD_COLUMNS} FROM seat_holds \
             WHERE event_id = $1 AND code = $2 AND seat_name = ANY($3) \
             ORDER BY {LATEST_FIRST} \
             FOR UPDATE"
        );
        let rows = sqlx::query_as::<_, SeatHoldRow>(&sql)
            .bind(event_id)
            .bind(code)
            .bind(&seat_names)
            .fetch_all(&mut *tx)
            .await
            .map_err(storage_error)?;

        let holds = rows
            .into_iter()
            .map(SeatHold::try_from)
            .collect::<CoreResult<Vec<_>>>()?;

        let mut ids = Vec::with_capacity(seats.len());
        for seat in seats {
            // Rows are newest first.
            let latest = holds.iter().find(|h| h.seat_name == seat.as_str());
            ensure_holder_hold_active(event_id, seat, latest, now)?;
            if let Some(h) = latest {
                ids.push(h.id);
            }
        }

        let sql = format!(
            "UPDATE seat_holds SET closed_at = $2, close_reason = $3, updated_at = $2 \
             WHERE id = ANY($1) \
             RETURNING {HOLD_COLUMNS}"
        );
        let closed = sqlx::query_as::<_, SeatHoldRow>(&sql)
            .bind(&ids)
            .bind(now)
            .bind(reason.as_str())
            .fetch_all(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;

        let mut closed = closed
            .into_iter()
            .map(SeatHold::try_from)
            .collect::<CoreResult<Vec<_>>>()?;
        // Same order as requested.
        closed.sort_by_key(|h| seats.iter().position(|s| s.as_str() == h.seat_name));
        Ok(closed)
    }
}
