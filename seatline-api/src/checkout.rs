use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use seatline_shared::SeatHoldEventKind;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::holds::seat_event;
use crate::middleware::CustomerClaims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmCheckoutRequest {
    pub seats: Vec<String>,
    pub payment_reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmCheckoutResponse {
    pub event_id: i64,
    pub seats: Vec<String>,
    pub payment_reference: Option<String>,
    pub confirmed_at: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/events/{event_id}/checkout/confirm", post(confirm_checkout))
}

/// POST /v1/events/{event_id}/checkout/confirm
/// Payment-confirmation boundary: every seat must still be held by the caller.
async fn confirm_checkout(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<ConfirmCheckoutRequest>,
) -> Result<Json<ConfirmCheckoutResponse>, AppError> {
    let closed = state
        .holds
        .complete_purchase(event_id, &claims.sub, &req.seats)
        .await?;

    for hold in &closed {
        state.publish(seat_event(SeatHoldEventKind::Sold, hold, state.holds.now()));
    }

    tracing::info!(
        event_id,
        payment_reference = req.payment_reference.as_deref().unwrap_or("-"),
        "Checkout confirmed for {} seat(s)",
        closed.len()
    );

    Ok(Json(ConfirmCheckoutResponse {
        event_id,
        seats: closed.into_iter().map(|h| h.seat_name).collect(),
        payment_reference: req.payment_reference,
        confirmed_at: state.holds.now(),
    }))
}
