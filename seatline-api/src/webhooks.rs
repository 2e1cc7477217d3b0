use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use seatline_core::{CloseReason, CoreError};
use seatline_shared::SeatHoldEventKind;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::holds::seat_event;
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentGateway {
    VietQr,
    ZaloPay,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Captured,
    Failed,
    Cancelled,
}

/// Normalised notification forwarded by the gateway adapters.
#[derive(Debug, Deserialize)]
pub struct PaymentNotification {
    pub gateway: PaymentGateway,
    pub transaction_id: String,
    pub event_id: i64,
    /// Holder code the order was placed under.
    pub code: String,
    pub seats: Vec<String>,
    pub status: PaymentOutcome,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub transaction_id: String,
    pub seats_closed: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// A capture whose holds already lapsed answers 410 so the gateway side refunds.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentNotification>,
) -> Result<Json<WebhookAck>, AppError> {
    let secret = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::AuthenticationError("Missing webhook secret".to_string()))?;
    if !secrets_match(secret, &state.webhook_secret) {
        return Err(AppError::AuthenticationError("Invalid webhook secret".to_string()));
    }

    tracing::info!(
        gateway = ?payload.gateway,
        transaction_id = %payload.transaction_id,
        event_id = payload.event_id,
        "Received payment {:?}",
        payload.status
    );

    let seats_closed = match payload.status {
        PaymentOutcome::Captured => capture(&state, &payload).await?,
        PaymentOutcome::Failed | PaymentOutcome::Cancelled => {
            let mut released = 0;
            for seat in &payload.seats {
                match state.holds.release(payload.event_id, seat, &payload.code).await {
                    Ok(outcome) if outcome.changed() => {
                        state.publish(seat_event(SeatHoldEventKind::Released, outcome.hold(), state.holds.now()));
                        released += 1;
                    }
                    // Closed earlier, e.g. a retried delivery.
                    Ok(_) => {}
                    // Nothing left to give back.
                    Err(CoreError::HoldNotFound { .. } | CoreError::HoldExpired { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            released
        }
    };

    Ok(Json(WebhookAck {
        transaction_id: payload.transaction_id,
        seats_closed,
    }))
}

/// Closes the seats as purchased. Seats this code already bought count as
/// acknowledged, so a retried capture answers 200 instead of a conflict.
async fn capture(state: &AppState, payload: &PaymentNotification) -> Result<usize, AppError> {
    if payload.seats.is_empty() {
        return Err(AppError::ValidationError("no seats given".to_string()));
    }

    let mut pending = Vec::with_capacity(payload.seats.len());
    for seat in &payload.seats {
        match state
            .holds
            .validate(payload.event_id, &payload.code, std::slice::from_ref(seat))
            .await
        {
            Ok(_) => pending.push(seat.clone()),
            Err(CoreError::HoldClosed { reason: CloseReason::Purchased, .. }) => {
                tracing::debug!(transaction_id = %payload.transaction_id, seat = %seat, "Seat already purchased");
            }
            Err(e) => {
                tracing::warn!(transaction_id = %payload.transaction_id, "Captured payment cannot be honoured: {}", e);
                return Err(e.into());
            }
        }
    }

    if pending.is_empty() {
        return Ok(0);
    }

    let closed = state
        .holds
        .complete_purchase(payload.event_id, &payload.code, &pending)
        .await
        .inspect_err(|e| {
            tracing::warn!(transaction_id = %payload.transaction_id, "Captured payment cannot be honoured: {}", e)
        })?;
    for hold in &closed {
        state.publish(seat_event(SeatHoldEventKind::Sold, hold, state.holds.now()));
    }
    Ok(closed.len())
}

/// Equal-length secrets are compared without an early exit.
fn secrets_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
