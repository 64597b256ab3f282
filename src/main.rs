//! Weather Telemetry Server - Binary Entry Point
//!
//! Serves the REST and WebSocket API, runs the change pipeline and, when
//! configured, the random data generator.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weather_telemetry::api::{create_router, AppState, ConnectionHub};
use weather_telemetry::ingest::spawn_generator;
use weather_telemetry::{
    ChangePipeline, KeyValueBackend, MemoryBackend, MemoryBackendConfig, ServerConfig,
    TelemetryContext,
};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_telemetry=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    tracing::info!(version = weather_telemetry::VERSION, "weather-server starting...");

    let config = ServerConfig::from_env();
    tracing::info!(?config, "configuration loaded");

    let backend_config = MemoryBackendConfig {
        page_size: config.query_page_size,
        ..Default::default()
    };
    let backend: Arc<dyn KeyValueBackend> = match &config.data_file {
        Some(path) => Arc::new(
            MemoryBackend::open(path, backend_config)
                .with_context(|| format!("opening write log {}", path.display()))?,
        ),
        None => Arc::new(MemoryBackend::with_config(backend_config)),
    };

    let context = TelemetryContext::new(backend);
    let hub = Arc::new(ConnectionHub::new());
    let dispatcher = Arc::new(context.dispatcher(hub.clone(), config.dispatch));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pipeline = ChangePipeline::new(dispatcher);
    let pipeline_handle = tokio::spawn(pipeline.run(context.store.subscribe_changes(), shutdown_rx.clone()));

    let generator_handle = config
        .generator
        .clone()
        .map(|generator| spawn_generator(context.ingest.clone(), generator, shutdown_rx.clone()));

    let state = Arc::new(AppState::new(context, hub));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = generator_handle {
        let _ = handle.await;
    }
    let _ = pipeline_handle.await;

    tracing::info!("weather-server shutdown complete");
    Ok(())
}
