//! ssync-daemon entry point.
//!
//! This file is intentionally thin: it resolves config, sets up tracing,
//! connects the engine (running migrations), optionally registers the
//! managed webhook for this deployment, wires middleware, and starts the
//! HTTP server with graceful shutdown.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use ssync_config::SyncConfig;
use ssync_daemon::{routes, state::AppState};
use ssync_engine::SyncEngine;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let (cfg, pool) = SyncConfig::from_env().context("configuration")?;
    let shutdown_grace = cfg.shutdown_grace;
    let engine = Arc::new(
        SyncEngine::connect(cfg, &pool)
            .await
            .context("engine startup")?,
    );

    // Register the provider-side endpoint when this deployment knows its
    // public URL; local runs without one still receive forwarded events.
    if let Ok(base_url) = std::env::var("SSYNC_WEBHOOK_URL") {
        let webhook = engine
            .find_or_create_managed_webhook(&base_url, None)
            .await
            .context("managed webhook registration")?;
        info!(id = %webhook.id, url = %webhook.url, "managed webhook ready");
    }

    let app = routes::build_router(Arc::new(AppState::new(Arc::clone(&engine))))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8466)));
    info!("ssync-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    // Drain in-flight work, then tear down managed webhooks per config.
    info!("shutting down");
    if tokio::time::timeout(grace_or_min(shutdown_grace), engine.shutdown())
        .await
        .is_err()
    {
        warn!("shutdown grace elapsed before teardown finished");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn grace_or_min(grace: Duration) -> Duration {
    grace.max(Duration::from_secs(1))
}

/// CORS: allow only localhost origins. Stripe's webhook POSTs are
/// server-to-server and unaffected; this only scopes browser access to the
/// operator endpoints.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("SSYNC_DAEMON_ADDR").ok()?.parse().ok()
}
