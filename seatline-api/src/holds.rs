use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use seatline_core::service::IssueHold;
use seatline_core::SeatHold;
use seatline_shared::{HolderInfo, SeatHoldEvent, SeatHoldEventKind};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{ClientMeta, CustomerClaims};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HoldSeatRequest {
    pub seat_name: String,
    pub holder: HolderInfo,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SeatsRequest {
    pub seats: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HoldResponse {
    pub hold_id: Uuid,
    pub event_id: i64,
    pub seat_name: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: i64,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<String>,
}

impl HoldResponse {
    pub fn from_hold(hold: &SeatHold, now: DateTime<Utc>) -> Self {
        Self {
            hold_id: hold.id,
            event_id: hold.event_id,
            seat_name: hold.seat_name.clone(),
            expires_at: hold.expire_time,
            expires_in_seconds: hold.remaining_seconds(now),
            closed_at: hold.closed_at,
            close_reason: hold.close_reason.map(|r| r.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueHoldResponse {
    #[serde(flatten)]
    pub hold: HoldResponse,
    pub refreshed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeldSeat {
    pub seat_name: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeatMapResponse {
    pub event_id: i64,
    pub held: Vec<HeldSeat>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub holds: Vec<HoldResponse>,
}

pub(crate) fn seat_event(kind: SeatHoldEventKind, hold: &SeatHold, now: DateTime<Utc>) -> SeatHoldEvent {
    SeatHoldEvent {
        kind,
        event_id: hold.event_id,
        seat_name: hold.seat_name.clone(),
        hold_id: hold.id,
        expires_at: match kind {
            SeatHoldEventKind::Held | SeatHoldEventKind::Refreshed => Some(hold.expire_time),
            SeatHoldEventKind::Released | SeatHoldEventKind::Sold => None,
        },
        timestamp: now.timestamp(),
    }
}

// ============================================================================
// Routes
// ============================================================================

/// Routes that act on the caller's own holds; wrap with customer auth.
pub fn holder_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events/{event_id}/holds", post(hold_seat))
        .route("/v1/events/{event_id}/holds/validate", post(validate_holds))
        .route("/v1/events/{event_id}/holds/{seat_name}", delete(release_seat))
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events/{event_id}/seat-map", get(seat_map))
        .route("/v1/events/{event_id}/stream", get(seat_stream))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/events/{event_id}/holds
async fn hold_seat(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Extension(claims): Extension<CustomerClaims>,
    client: ClientMeta,
    Json(req): Json<HoldSeatRequest>,
) -> Result<(StatusCode, Json<IssueHoldResponse>), AppError> {
    let outcome = state
        .holds
        .issue(IssueHold {
            event_id,
            seat_name: req.seat_name,
            code: claims.sub,
            user_info: req.holder,
            ttl_seconds: req.ttl_seconds,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
        })
        .await?;

    let refreshed = outcome.is_refresh();
    let hold = outcome.into_hold();
    let kind = if refreshed { SeatHoldEventKind::Refreshed } else { SeatHoldEventKind::Held };
    state.publish(seat_event(kind, &hold, state.holds.now()));

    let status = if refreshed { StatusCode::OK } else { StatusCode::CREATED };
    let now = state.holds.now();
    Ok((
        status,
        Json(IssueHoldResponse {
            hold: HoldResponse::from_hold(&hold, now),
            refreshed,
        }),
    ))
}

/// POST /v1/events/{event_id}/holds/validate
async fn validate_holds(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<SeatsRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    let holds = state.holds.validate(event_id, &claims.sub, &req.seats).await?;
    let now = state.holds.now();

    Ok(Json(ValidateResponse {
        valid: true,
        holds: holds.iter().map(|h| HoldResponse::from_hold(h, now)).collect(),
    }))
}

/// DELETE /v1/events/{event_id}/holds/{seat_name}
async fn release_seat(
    State(state): State<AppState>,
    Path((event_id, seat_name)): Path<(i64, String)>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<HoldResponse>, AppError> {
    let outcome = state.holds.release(event_id, &seat_name, &claims.sub).await?;
    if outcome.changed() {
        state.publish(seat_event(SeatHoldEventKind::Released, outcome.hold(), state.holds.now()));
    }

    Ok(Json(HoldResponse::from_hold(outcome.hold(), state.holds.now())))
}

/// GET /v1/events/{event_id}/seat-map
/// Seats currently blocked by a hold. Holder details are not exposed.
async fn seat_map(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<SeatMapResponse>, AppError> {
    let held = state
        .holds
        .active_holds(event_id)
        .await?
        .into_iter()
        .map(|h| HeldSeat {
            seat_name: h.seat_name,
            expires_at: h.expire_time,
        })
        .collect();

    Ok(Json(SeatMapResponse { event_id, held }))
}

/// GET /v1/events/{event_id}/stream
async fn seat_stream(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state.holds.event(event_id).await?;

    let rx = state.hold_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| async move {
        match msg {
            Ok(ev) if ev.event_id == event_id => Event::default()
                .event(ev.kind.as_str())
                .json_data(&ev)
                .ok()
                .map(Ok),
            // Lagged receivers just skip what they missed.
            _ => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
