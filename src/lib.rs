pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod rate_limit;

use crate::config::LimiterConfig;
use crate::error::{LimiterError, Result};
use crate::metrics::{metrics_handler, MetricsService};
use crate::observability::{request_id_middleware, request_span};
use crate::rate_limit::{rate_limit_middleware, RateLimitMiddleware, RateLimiterService, RedisStore};
use axum::{middleware, routing::get, Router as AxumRouter};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use crate::observability::init_tracing;

/// Body of the welcome page
pub const WELCOME_MESSAGE: &str = "Welcome to the rate limited server!\n";

/// Welcome handler behind the rate limiter
pub async fn welcome_handler() -> &'static str {
    WELCOME_MESSAGE
}

/// Liveness probe, never rate limited
pub async fn health_handler() -> &'static str {
    "OK"
}

/// Build the HTTP router.
///
/// Only `/` is rate limited. `/health` and `/metrics` stay reachable for
/// probes and scrapers.
pub fn build_router(limiter: RateLimitMiddleware, metrics: Option<MetricsService>) -> AxumRouter {
    let limited = AxumRouter::new()
        .route("/", get(welcome_handler))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    let mut app = AxumRouter::new()
        .route("/health", get(health_handler))
        .merge(limited);

    if let Some(metrics) = metrics {
        app = app.route("/metrics", get(metrics_handler).with_state(metrics));
    }

    // Request IDs are assigned outside the trace layer so its span can carry them
    app.layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(middleware::from_fn(request_id_middleware))
}

/// Connect the store, build the engine and serve until shutdown
pub async fn init_limiter(config: LimiterConfig) -> Result<()> {
    // Validate configuration
    config.validate()?;

    info!("Starting edge limiter");
    info!(
        address_limit = config.limits.address,
        token_limit = config.limits.token,
        ban_secs = config.limits.ban_duration_secs,
        failure_policy = config.failure_policy.as_str(),
        "Loaded rate limits"
    );

    let store = RedisStore::connect(
        &config.store.redis_url(),
        config.store.key_prefix.clone(),
        config.limits.ban_duration(),
    )
    .await?;

    if config.store.flush_on_startup {
        store.flush_all().await?;
    }

    let mut service = RateLimiterService::new(Arc::new(store), config.limits.class_limits());
    if let Some(timeout) = config.store.timeout() {
        service = service.with_store_timeout(timeout);
    }

    let limiter =
        RateLimitMiddleware::new(service, config.token_header_name()?, config.failure_policy);
    let metrics = MetricsService::new()?;

    let app = build_router(limiter, Some(metrics));

    // Bind and serve
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(LimiterError::Io)?;

    info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| LimiterError::Internal(format!("Server error: {}", e)))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
