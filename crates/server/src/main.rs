mod bootstrap;
mod health;
mod sessions;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use deploydesk_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use deploydesk_core::config::LogFormat::*;
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
    // Logging needs the config, so load it before anything else.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let router = Router::new()
        .merge(health::router(app.sessions.clone()))
        .merge(sessions::router(app.sessions.clone()));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "deploydesk-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown(grace)).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "deploydesk-server stopped"
    );
    Ok(())
}

async fn wait_for_shutdown(grace: Duration) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
        return;
    }
    tracing::info!(
        event_name = "system.server.draining",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "shutdown requested, draining in-flight turns"
    );
    // Bounds the drain window.
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "graceful shutdown window elapsed"
        );
        std::process::exit(0);
    });
}
