//! Field Management Server
//!
//! Talks to the driver stations on the field network and serves the
//! operator and audience pages.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use field_fms::{config::AppConfig, field::Field, ui::WebServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting field management server");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref()).context("loading config")?;

    let field = Arc::new(Field::from_config(&config).context("building field")?);
    field
        .start_comms()
        .await
        .context("starting driver station comms")?;

    let web_handle = WebServer::new(config.ui.clone(), field.clone()).start_background();
    tracing::info!("Admin UI available at http://{}", config.ui.admin_address);

    tokio::select! {
        result = web_handle => {
            match result {
                Ok(Err(e)) => tracing::error!("Web server failed: {}", e),
                Err(e) => tracing::error!("Web server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    field.shutdown().await;
    Ok(())
}
