mod bootstrap;
mod health;
mod routes;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use agentpay_core::config::{AppConfig, LoadOptions};
use anyhow::Result;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;

fn init_logging(config: &AppConfig) {
    use agentpay_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    // Load config and initialize logging before any other operations
    let config = bootstrap::load_config(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let router = routes::router(app.runtime.clone())
        .merge(health::router(health::HealthState::from(&app.config)))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "agentpay-server started"
    );

    let shutdown = Arc::new(Notify::new());
    let server = tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown({
                let shutdown = shutdown.clone();
                async move { shutdown.notified().await }
            })
            .into_future(),
    );

    wait_for_shutdown().await;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "agentpay-server stopping"
    );
    shutdown.notify_one();

    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish within the grace period"
        ),
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for ctrl-c; shutdown signal disabled"
        );
        std::future::pending::<()>().await;
    }
}
