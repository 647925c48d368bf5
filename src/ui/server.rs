//! Admin and viewer HTTP servers

use axum::{routing::get, routing::get_service, Router};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::UiConfig;
use crate::field::Field;

use super::handlers::get_state;
use super::websocket::{admin_ws, viewer_ws};

/// Operator-facing router: command websocket, status API, static UI
pub fn admin_router(field: Arc<Field>, config: &UiConfig) -> Router {
    Router::new()
        .route("/ws", get(admin_ws))
        .route("/api/state", get(get_state))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(CorsLayer::permissive())
        .with_state(field)
}

/// Audience-facing router: read-only status
pub fn viewer_router(field: Arc<Field>, config: &UiConfig) -> Router {
    Router::new()
        .route("/", get_service(ServeFile::new(config.static_dir.join("viewer.html"))))
        .route("/ws", get(viewer_ws))
        .route("/api/state", get(get_state))
        .with_state(field)
}

/// Front end web servers
pub struct WebServer {
    config: UiConfig,
    field: Arc<Field>,
}

impl WebServer {
    pub fn new(config: UiConfig, field: Arc<Field>) -> Self {
        Self { config, field }
    }

    /// Serve admin and viewer until either fails
    pub async fn run(self) -> std::io::Result<()> {
        let admin = admin_router(self.field.clone(), &self.config);
        let viewer = viewer_router(self.field.clone(), &self.config);

        let admin_listener = tokio::net::TcpListener::bind(self.config.admin_address).await?;
        let viewer_listener = tokio::net::TcpListener::bind(self.config.viewer_address).await?;
        tracing::info!("Starting admin HTTP server on {}", self.config.admin_address);
        tracing::info!("Starting viewer HTTP server on {}", self.config.viewer_address);

        tokio::try_join!(
            axum::serve(admin_listener, admin),
            axum::serve(viewer_listener, viewer),
        )?;
        Ok(())
    }

    /// Start in background
    pub fn start_background(self) -> JoinHandle<std::io::Result<()>> {
        tokio::spawn(self.run())
    }
}
