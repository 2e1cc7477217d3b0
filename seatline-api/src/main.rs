use std::sync::Arc;
use std::net::SocketAddr;
use anyhow::Context;
use seatline_api::{app, state::{AppState, AuthConfig, RateLimitConfig}};
use seatline_core::{HoldService, SystemClock};
use seatline_store::{app_config::Config, DbClient, PgEventDirectory, PgSeatHoldRepository, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seatline_api=debug,seatline_core=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Seatline API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .context("Failed to read business rules")?;
    let policy = rules.hold_policy().context("Invalid seat hold durations")?;
    tracing::info!(
        "Seat holds last {}s by default (allowed {}..={}s)",
        policy.default_ttl_seconds,
        policy.min_ttl_seconds,
        policy.max_ttl_seconds
    );

    let redis = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url).context("Invalid Redis URL")?,
        )),
        None => {
            tracing::warn!("No Redis configured, rate limiting disabled");
            None
        }
    };

    let holds = HoldService::new(
        Arc::new(PgSeatHoldRepository::new(db.pool.clone())),
        Arc::new(PgEventDirectory::new(db.pool.clone())),
        Arc::new(SystemClock),
        policy,
    );

    // Seat feed for SSE subscribers
    let (hold_tx, _) = tokio::sync::broadcast::channel(256);

    let app_state = AppState {
        holds: Arc::new(holds),
        redis,
        hold_tx,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        webhook_secret: config.webhooks.secret.clone(),
        rate_limit: RateLimitConfig {
            requests: rules.rate_limit_requests,
            window_seconds: rules.rate_limit_window_seconds,
            trusted_proxies: config.server.trusted_proxies.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>()
    ).await?;

    Ok(())
}
