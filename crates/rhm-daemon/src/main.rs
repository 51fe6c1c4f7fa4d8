//! rhm-daemon entry point.
//!
//! Loads configuration, connects the store, wires middleware and starts the
//! HTTP server. Route handlers live in `routes.rs`; shared state and the
//! background sweeps live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use rhm_config::{report_unused_keys, secrets::resolve_secrets, ConfigMode, UnusedKeyPolicy};
use rhm_daemon::{routes, state};
use rhm_db::PgStore;
use rhm_lifecycle::Market;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = rhm_config::load_from_env()?;
    let settings = loaded.settings()?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let unused = report_unused_keys(ConfigMode::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config keys not read by the daemon");
    }

    let secrets = resolve_secrets(&loaded.config_json, ConfigMode::Daemon)?;
    let pool = rhm_db::connect(
        secrets.require_database_url()?,
        settings.database.max_connections,
    )
    .await?;
    rhm_db::migrate(&pool).await?;

    let market = Market::new(Arc::new(PgStore::new(pool)), settings.lease.policy.clone());
    let shared = Arc::new(state::AppState::new(market, settings.bus.capacity));

    state::spawn_heartbeat(
        shared.bus.clone(),
        Duration::from_secs(settings.bus.heartbeat_secs.max(1)),
    );

    if settings.reconcile.on_start {
        if let Some(out) = state::reconcile_once(&shared, false).await {
            info!(
                fixed = out.fixed,
                unresolved = out.unresolved.len(),
                "startup reconcile done"
            );
        }
    }

    if settings.lease.expiry_sweep_secs > 0 {
        state::spawn_lease_expiry_sweep(
            Arc::clone(&shared),
            Duration::from_secs(settings.lease.expiry_sweep_secs),
        );
    }

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors(&settings.server.cors_origins));

    let addr = match bind_addr_from_env() {
        Some(addr) => addr,
        None => settings.bind_addr()?,
    };
    info!("rhm-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    info!("rhm-daemon stopped");
    Ok(())
}

/// Resolves on Ctrl-C, letting in-flight requests finish before exit.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            // No signal handler means no clean stop; keep serving.
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("RHM_DAEMON_ADDR").ok()?.parse().ok()
}

fn cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
