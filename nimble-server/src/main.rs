mod app;
mod config;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env()?;
    init_tracing(config.log_format);

    let server = app::build(&config).await?;

    match server.blobs.resume_pending().await {
        Ok(0) => {}
        Ok(queued) => info!(queued, "Re-queued pending uploads"),
        Err(err) => warn!(error = %err, "Could not resume pending uploads"),
    }

    server
        .app
        .clone()
        .listen_with_shutdown(config.addr(), shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining upload workers");
    server.queue.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Could not listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
