use std::sync::Arc;

use freight_dashboard::api;
use freight_dashboard::config;
use freight_dashboard::error::AppError;
use freight_dashboard::state::AppState;
use freight_dashboard::transport::InMemoryTransport;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let mut transport = InMemoryTransport::new(config.event_buffer_size);
    if config.auto_reply {
        transport = transport.with_auto_reply(Duration::from_millis(config.reply_delay_ms));
    }
    if config.seed_demo_data {
        transport.seed_demo().await?;
    }

    let shared_state = Arc::new(AppState::new(
        Arc::new(transport),
        config.event_buffer_size,
    ));
    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    shared_state.end_session().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
