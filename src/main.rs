use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use frontdesk::config::Config;
use frontdesk::desk::FrontDesk;
use frontdesk::directory::InMemoryDirectory;
use frontdesk::engine::Engine;
use frontdesk::{http, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_tracing();

    let config = Config::from_env()?;
    observability::init_metrics(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let directory = match &config.directory_file {
        Some(path) => InMemoryDirectory::from_file(path)?,
        None => {
            tracing::warn!("HOTEL_DIRECTORY_FILE not set; no rooms or guests are known");
            InMemoryDirectory::new()
        }
    };
    let directory = Arc::new(directory);

    let engine = Arc::new(Engine::new(config.wal_path(), config.engine_options())?);
    let desk = Arc::new(FrontDesk::new(
        engine.clone(),
        directory.clone(),
        directory.clone(),
        config.zone,
    ));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("frontdesk listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  rooms: {}, guests: {}", directory.room_count(), directory.guest_count());
    info!("  reservations: {}", engine.reservation_count());
    info!("  utc_offset: {}", config.zone.offset());
    info!("  storage_timeout: {:?}", config.storage_timeout);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, http::router(desk))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("frontdesk stopped");
    Ok(())
}

/// Resolves on SIGTERM or ctrl-c; in-flight requests are drained by axum.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
        }
    };
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await;
    info!("shutdown signal received, draining requests");
}
