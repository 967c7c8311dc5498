use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ara_relay_service::config::{LogConfig, LogFormat, Settings};
use ara_relay_service::server::{create_app, AppState};
use ara_relay_service::shutdown::GracefulShutdown;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.log);
    tracing::info!(
        routing_mode = settings.websocket.routing_mode.as_str(),
        ping_interval_secs = settings.websocket.ping_interval,
        pong_timeout_secs = settings.websocket.pong_timeout().as_secs(),
        "Configuration loaded"
    );

    // Create application state
    let state = AppState::new(settings.clone());
    let shutdown = GracefulShutdown::new(state.lifecycle.clone());
    tracing::info!("Application state initialized");

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Upgraded sockets are not tracked by axum; drain the relay ourselves
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown_signal_handler().await;
            shutdown.execute(reason).await;
        })
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match log.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal_handler() -> &'static str {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "ctrl_c"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "terminate"
        }
    }
}
