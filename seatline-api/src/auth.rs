use axum::{
    extract::State,
    Json,
    routing::post,
    Router,
};
use serde::Serialize;
use jsonwebtoken::{encode, Header, EncodingKey};
use chrono::{Utc, Duration};
use uuid::Uuid;
use crate::{state::{AppState, AuthConfig}, error::AppError, middleware::auth::CustomerClaims};

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    /// Holder code the seat holds of this session are filed under.
    holder_code: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/auth/guest", post(login_guest))
}

pub fn sign_customer_token(auth: &AuthConfig, sub: &str, role: &str, email: Option<String>) -> Result<String, AppError> {
    let claims = CustomerClaims {
        sub: sub.to_owned(),
        email,
        role: role.to_owned(),
        exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

async fn login_guest(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let holder_code = format!("guest-{}", Uuid::new_v4().simple());
    let token = sign_customer_token(&state.auth, &holder_code, "GUEST", None)?;

    Ok(Json(AuthResponse { token, holder_code }))
}
