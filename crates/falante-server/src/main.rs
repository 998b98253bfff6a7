//! Falante TTS Server - HTTP API for voice-cloning speech synthesis

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod state;

use falante_core::model::worker::WorkerBridge;
use falante_core::{config::env_parse, EngineConfig, TtsEngine};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "falante_server=debug,falante_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Falante TTS server");

    let config = EngineConfig::from_env();
    info!(
        "Session cache: ttl {}s, capacity {}",
        config.session_ttl_secs, config.max_sessions
    );

    let mut model = WorkerBridge::new(&config);
    if let Err(e) = model.probe() {
        // The bridge retries on first use, so a missing worker at boot is
        // not fatal.
        warn!("Model worker not reachable yet: {}", e);
    }

    let engine = TtsEngine::new(Box::new(model), &config);
    let app = api::create_router(AppState::new(engine));

    let host = std::env::var("FALANTE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env_parse("FALANTE_PORT", 8000u16);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    server.await?;

    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
