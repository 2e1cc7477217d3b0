use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use seatline_core::{CloseReason, HoldState, SeatHold};
use seatline_shared::SeatHoldEventKind;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::holds::seat_event;
use crate::middleware::AdminClaims;
use crate::state::AppState;

/// Full hold record, holder snapshot included. Back-office only.
#[derive(Debug, Serialize)]
pub struct HoldDetailResponse {
    #[serde(flatten)]
    pub hold: SeatHold,
    pub state: HoldState,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/holds/{hold_id}", get(get_hold))
        .route("/v1/admin/holds/{hold_id}/close", post(close_hold))
}

/// GET /v1/admin/holds/{hold_id}
async fn get_hold(
    State(state): State<AppState>,
    Path(hold_id): Path<Uuid>,
) -> Result<Json<HoldDetailResponse>, AppError> {
    let hold = state.holds.get(hold_id).await?;
    let now = state.holds.now();

    Ok(Json(HoldDetailResponse {
        state: hold.state_at(now),
        hold,
    }))
}

/// POST /v1/admin/holds/{hold_id}/close
async fn close_hold(
    State(state): State<AppState>,
    Path(hold_id): Path<Uuid>,
    Extension(admin): Extension<AdminClaims>,
) -> Result<Json<HoldDetailResponse>, AppError> {
    let outcome = state.holds.close(hold_id, CloseReason::Admin).await?;

    // Repeat closes change nothing and announce nothing.
    if outcome.changed() {
        tracing::info!(hold_id = %hold_id, admin = %admin.sub, "Hold closed by administrator");
        state.publish(seat_event(SeatHoldEventKind::Released, outcome.hold(), state.holds.now()));
    }

    let hold = outcome.into_hold();
    let now = state.holds.now();
    Ok(Json(HoldDetailResponse {
        state: hold.state_at(now),
        hold,
    }))
}
