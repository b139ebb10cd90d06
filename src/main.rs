//! Smriti memory server binary: configuration, route assembly, and
//! graceful shutdown.

use anyhow::{anyhow, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use smriti_memory::constants::{DATABASE_FLUSH_TIMEOUT_SECS, GRACEFUL_SHUTDOWN_TIMEOUT_SECS};
use smriti_memory::handlers::{build_protected_routes, build_public_routes, ServiceState};
use smriti_memory::{auth, metrics, middleware, tracing_setup, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_setup::init_tracing();
    metrics::register_metrics();

    info!("starting smriti-memory server");

    let config = ServerConfig::from_env();
    config.log_summary();
    let key_count = auth::check_registry()?;
    info!(key_count, "agent key registry loaded");

    let host = config.host.clone();
    let port = config.port;
    let max_body_bytes = config.max_body_bytes;
    let concurrency_limit = config.concurrency_limit;
    let rate_budget = config.rate_limit.budget;
    let rate_window_secs = config.rate_limit.window.as_secs().max(1);

    let state = Arc::new(ServiceState::new(config)?);
    let state_for_shutdown = state.clone();

    // IP-level flood protection in front of the per-agent limiter
    // inside the pipeline.
    let per_second = (u64::from(rate_budget) / rate_window_secs).max(1);
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(rate_budget.max(1))
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limiter configuration"))?;

    let protected = build_protected_routes(state.clone())
        .layer(axum::middleware::from_fn(auth::auth_middleware))
        .layer(GovernorLayer::new(governor_conf));

    let app = Router::new()
        .merge(build_public_routes(state.clone()))
        .merge(protected)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow!("invalid listen address {host}:{port}: {e}"))?;
    info!("listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("draining complete, flushing stores");

    let cleanup = async {
        let flush = async { state_for_shutdown.flush() };
        match tokio::time::timeout(
            std::time::Duration::from_secs(DATABASE_FLUSH_TIMEOUT_SECS),
            flush,
        )
        .await
        {
            Ok(Ok(())) => info!("stores flushed"),
            Ok(Err(e)) => error!("failed to flush stores: {e:#}"),
            Err(_) => error!("store flush timed out after {DATABASE_FLUSH_TIMEOUT_SECS}s"),
        }
    };

    match tokio::time::timeout(
        std::time::Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        cleanup,
    )
    .await
    {
        Ok(()) => info!("shutdown complete"),
        Err(_) => {
            error!("graceful shutdown timed out after {GRACEFUL_SHUTDOWN_TIMEOUT_SECS}s, forcing exit");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
