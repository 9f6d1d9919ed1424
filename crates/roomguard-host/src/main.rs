//! roomguard sidecar
//!
//! - Loads the homeserver config (path from argv[1], `ROOMGUARD_CONFIG`, or
//!   `homeserver.yaml`)
//! - Builds the module chain and starts the provisioners
//! - Serves the check + ops endpoints until SIGINT, then drains

use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use roomguard_core::error::{Result, RoomGuardError};
use roomguard_host::{app_state::AppState, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "roomguard failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ROOMGUARD_CONFIG").ok())
        .unwrap_or_else(|| "homeserver.yaml".to_string());

    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .roomguard
        .listen
        .parse()
        .map_err(|e| RoomGuardError::BadConfig(format!("roomguard.listen: {e}")))?;
    let grace = Duration::from_millis(cfg.roomguard.drain_grace_ms);
    tracing::info!(config = %path, server_name = %cfg.server_name, "config loaded");

    let (state, provisioners) = AppState::new(cfg)?;
    state.spawn_provisioners(provisioners);

    let app = router::build_router(state.clone());

    tracing::info!(%listen, modules = ?state.engine().module_names(), "roomguard starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| RoomGuardError::Internal(format!("bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state, grace))
        .await
        .map_err(|e| RoomGuardError::Internal(format!("server failed: {e}")))?;

    tracing::info!("roomguard stopped");
    Ok(())
}

/// Wait for SIGINT, report not-ready, then give the homeserver `grace` to
/// notice before the listener closes.
async fn shutdown_signal(state: AppState, grace: Duration) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "signal handler failed");
    }
    state.set_draining();
    tracing::info!(grace_ms = grace.as_millis() as u64, "draining");
    tokio::time::sleep(grace).await;
}
