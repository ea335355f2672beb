use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::app::{router, AppState};
use crate::backend::Backend;
use crate::config::{AppConfig, BackendKind, Environment};

pub async fn handle(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    config.validate()?;
    info!("Starting items-api in {:?} mode", config.environment);
    if config.environment == Environment::Production && config.backend.kind == BackendKind::Memory {
        warn!("Memory backend in production: accounts and items are lost on restart");
    }

    let backend = Backend::connect(&config).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Listening on http://{}", listener.local_addr()?);

    let app = router(AppState::new(config, backend));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
