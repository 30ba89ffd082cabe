//! Server entry point: configuration, tracing, metrics, and the axum
//! listener with graceful shutdown.

use anyhow::Context;
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jamroom_server::config::HubSettings;
use jamroom_server::{AppState, metrics, router};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = HubSettings::load();
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    let recorder = metrics::install_recorder();
    let state = AppState::new(settings, recorder);
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received, closing sessions");
            // Sessions watch this token and close with a forced-shutdown
            // announcement before the listener stops.
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        let _ = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
