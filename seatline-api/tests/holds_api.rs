use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use seatline_api::{
    app,
    auth::sign_customer_token,
    middleware::AdminClaims,
    state::{AppState, AuthConfig, RateLimitConfig},
    webhooks::WEBHOOK_SECRET_HEADER,
};
use seatline_core::{
    memory::{InMemoryEventDirectory, InMemorySeatHoldRepository},
    EventSummary, HoldPolicy, HoldService, ManualClock,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test-secret";
const WEBHOOK_SECRET: &str = "hook-secret";

struct TestApp {
    router: Router,
    clock: ManualClock,
    state: AppState,
}

fn setup() -> TestApp {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    let events = InMemoryEventDirectory::with_events([EventSummary {
        id: 10,
        name: "Spring Gala".to_string(),
        starts_at: None,
    }]);
    let holds = HoldService::new(
        Arc::new(InMemorySeatHoldRepository::new()),
        Arc::new(events),
        Arc::new(clock.clone()),
        HoldPolicy::default(),
    );
    let (hold_tx, _) = tokio::sync::broadcast::channel(16);

    let state = AppState {
        holds: Arc::new(holds),
        redis: None,
        hold_tx,
        auth: AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        },
        webhook_secret: WEBHOOK_SECRET.to_string(),
        rate_limit: RateLimitConfig {
            requests: 100,
            window_seconds: 60,
            trusted_proxies: Vec::new(),
        },
    };

    TestApp {
        router: app(state.clone()),
        clock,
        state,
    }
}

fn customer_token(app: &TestApp, code: &str) -> String {
    sign_customer_token(&app.state.auth, code, "GUEST", None).unwrap()
}

fn admin_token() -> String {
    let claims = AdminClaims {
        sub: "admin-1".to_string(),
        email: "ops@example.com".to_string(),
        role: "ADMIN".to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn guest_holder() -> Value {
    json!({
        "kind": "guest",
        "full_name": "Lan Nguyen",
        "email": "lan@example.com",
        "extra": { "student_id": "S-42" }
    })
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn hold_seat(app: &TestApp, code: &str, seat: &str, ttl: Option<u64>) -> (StatusCode, Value) {
    let token = customer_token(app, code);
    send(
        app,
        Method::POST,
        "/v1/events/10/holds",
        Some(&token),
        Some(json!({ "seat_name": seat, "holder": guest_holder(), "ttl_seconds": ttl })),
    )
    .await
}

#[tokio::test]
async fn test_hold_requires_token() {
    let app = setup();
    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/events/10/holds",
        None,
        Some(json!({ "seat_name": "A1", "holder": guest_holder() })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guest_login_issues_usable_token() {
    let app = setup();
    let (status, body) = send(&app, Method::POST, "/auth/guest", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    assert!(body["holder_code"].as_str().unwrap().starts_with("guest-"));

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/events/10/holds",
        Some(&token),
        Some(json!({ "seat_name": "B2", "holder": guest_holder() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_issue_then_refresh() {
    let app = setup();
    let (status, first) = hold_seat(&app, "sess-1", "a1", Some(120)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["seat_name"], "A1");
    assert_eq!(first["refreshed"], false);
    assert_eq!(first["expires_in_seconds"], 120);

    app.clock.advance(Duration::seconds(60));
    let (status, second) = hold_seat(&app, "sess-1", "A1", Some(120)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["refreshed"], true);
    assert_eq!(second["hold_id"], first["hold_id"]);
    assert_eq!(second["expires_in_seconds"], 120);
}

#[tokio::test]
async fn test_conflict_then_takeover_after_expiry() {
    let app = setup();
    let (status, _) = hold_seat(&app, "sess-1", "A1", Some(120)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = hold_seat(&app, "sess-2", "A1", Some(120)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("A1"));

    app.clock.advance(Duration::seconds(120));
    let (status, body) = hold_seat(&app, "sess-3", "A1", Some(120)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["refreshed"], false);
}

#[tokio::test]
async fn test_unknown_event_and_bad_seat() {
    let app = setup();
    let token = customer_token(&app, "sess-1");

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/events/99/holds",
        Some(&token),
        Some(json!({ "seat_name": "A1", "holder": guest_holder() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = hold_seat(&app, "sess-1", "A 1!", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_validate_and_confirm_after_expiry_is_gone() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", Some(60)).await;
    let token = customer_token(&app, "sess-1");

    app.clock.advance(Duration::seconds(59));
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/events/10/holds/validate",
        Some(&token),
        Some(json!({ "seats": ["A1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["holds"][0]["expires_in_seconds"], 1);

    app.clock.advance(Duration::seconds(2));
    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/events/10/holds/validate",
        Some(&token),
        Some(json!({ "seats": ["A1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/events/10/checkout/confirm",
        Some(&token),
        Some(json!({ "seats": ["A1"], "payment_reference": "PAY-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_confirm_closes_all_seats() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", None).await;
    hold_seat(&app, "sess-1", "A2", None).await;
    let token = customer_token(&app, "sess-1");

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/events/10/checkout/confirm",
        Some(&token),
        Some(json!({ "seats": ["A1", "A2"], "payment_reference": "PAY-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seats"], json!(["A1", "A2"]));

    // A second confirmation finds the holds already purchased.
    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/events/10/checkout/confirm",
        Some(&token),
        Some(json!({ "seats": ["A1", "A2"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, map) = send(&app, Method::GET, "/v1/events/10/seat-map", None, None).await;
    assert_eq!(map["held"], json!([]));
}

#[tokio::test]
async fn test_release_frees_seat() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", None).await;
    let token = customer_token(&app, "sess-1");

    let (status, body) = send(&app, Method::DELETE, "/v1/events/10/holds/a1", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["close_reason"], "cancelled");

    let (status, _) = hold_seat(&app, "sess-2", "A1", None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, Method::DELETE, "/v1/events/10/holds/C9", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_release_after_expiry_is_gone() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", Some(60)).await;
    let token = customer_token(&app, "sess-1");
    app.clock.advance(Duration::seconds(61));

    let (status, _) = send(&app, Method::DELETE, "/v1/events/10/holds/A1", Some(&token), None).await;
    assert_eq!(status, StatusCode::GONE);

    // Still reported as expired, not as a closed hold.
    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/events/10/holds/validate",
        Some(&token),
        Some(json!({ "seats": ["A1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_seat_map_lists_only_active_holds() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", Some(60)).await;
    hold_seat(&app, "sess-2", "A2", Some(300)).await;

    let (status, map) = send(&app, Method::GET, "/v1/events/10/seat-map", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(map["held"].as_array().unwrap().len(), 2);

    app.clock.advance(Duration::seconds(61));
    let (_, map) = send(&app, Method::GET, "/v1/events/10/seat-map", None, None).await;
    let held = map["held"].as_array().unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0]["seat_name"], "A2");
    assert!(held[0].get("code").is_none());

    let (status, _) = send(&app, Method::GET, "/v1/events/99/seat-map", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_close_is_idempotent() {
    let app = setup();
    let (_, held) = hold_seat(&app, "sess-1", "A1", None).await;
    let hold_id = held["hold_id"].as_str().unwrap().to_string();
    let admin = admin_token();
    let mut feed = app.state.hold_tx.subscribe();

    let customer = customer_token(&app, "sess-1");
    let uri = format!("/v1/admin/holds/{}/close", hold_id);
    let (status, _) = send(&app, Method::POST, &uri, Some(&customer), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, first) = send(&app, Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["close_reason"], "admin");
    assert_eq!(first["state"]["state"], "closed");

    app.clock.advance(Duration::seconds(5));
    let (status, second) = send(&app, Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["closed_at"], first["closed_at"]);

    // Only the first close announces the seat.
    assert_eq!(feed.try_recv().unwrap().kind.as_str(), "released");
    assert!(feed.try_recv().is_err());

    let (status, detail) = send(&app, Method::GET, &format!("/v1/admin/holds/{}", hold_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["user_info"]["kind"], "guest");

    let unknown = format!("/v1/admin/holds/{}/close", uuid::Uuid::new_v4());
    let (status, _) = send(&app, Method::POST, &unknown, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn send_webhook(app: &TestApp, secret: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/v1/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(secret) = secret {
        builder = builder.header(WEBHOOK_SECRET_HEADER, secret);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn notification(status: &str, seats: Value) -> Value {
    json!({
        "gateway": "zalopay",
        "transaction_id": "TX-1",
        "event_id": 10,
        "code": "sess-1",
        "seats": seats,
        "status": status,
    })
}

#[tokio::test]
async fn test_webhook_rejects_bad_secret() {
    let app = setup();
    let (status, _) = send_webhook(&app, None, notification("captured", json!(["A1"]))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_webhook(&app, Some("wrong"), notification("captured", json!(["A1"]))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_capture_completes_purchase() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", None).await;
    let mut feed = app.state.hold_tx.subscribe();

    let (status, ack) = send_webhook(&app, Some(WEBHOOK_SECRET), notification("captured", json!(["A1"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["seats_closed"], 1);

    let event = feed.try_recv().unwrap();
    assert_eq!(event.seat_name, "A1");
    assert_eq!(event.kind.as_str(), "sold");
}

#[tokio::test]
async fn test_webhook_capture_after_expiry_is_gone() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", Some(60)).await;
    app.clock.advance(Duration::seconds(61));

    let (status, _) = send_webhook(&app, Some(WEBHOOK_SECRET), notification("captured", json!(["A1"]))).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_webhook_failure_releases_holds() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", None).await;

    let (status, ack) = send_webhook(&app, Some(WEBHOOK_SECRET), notification("failed", json!(["A1", "A2"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["seats_closed"], 1);

    // Duplicate delivery releases nothing new.
    let (status, ack) = send_webhook(&app, Some(WEBHOOK_SECRET), notification("failed", json!(["A1"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["seats_closed"], 0);

    let (status, _) = hold_seat(&app, "sess-2", "A1", None).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_webhook_duplicate_capture_is_acknowledged() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", None).await;
    hold_seat(&app, "sess-1", "A2", None).await;

    let (status, ack) = send_webhook(&app, Some(WEBHOOK_SECRET), notification("captured", json!(["A1"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["seats_closed"], 1);

    let (status, ack) = send_webhook(&app, Some(WEBHOOK_SECRET), notification("captured", json!(["A1", "A2"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["seats_closed"], 1);

    let mut feed = app.state.hold_tx.subscribe();
    let (status, ack) = send_webhook(&app, Some(WEBHOOK_SECRET), notification("captured", json!(["A1", "A2"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["seats_closed"], 0);
    assert!(feed.try_recv().is_err());
}

#[tokio::test]
async fn test_webhook_failure_after_expiry_leaves_hold_lapsed() {
    let app = setup();
    hold_seat(&app, "sess-1", "A1", Some(60)).await;
    app.clock.advance(Duration::seconds(61));

    let (status, ack) = send_webhook(&app, Some(WEBHOOK_SECRET), notification("cancelled", json!(["A1"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["seats_closed"], 0);

    let token = customer_token(&app, "sess-1");
    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/events/10/holds/validate",
        Some(&token),
        Some(json!({ "seats": ["A1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}
