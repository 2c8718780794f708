use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Query, ws::WebSocketUpgrade},
    middleware,
    routing::get,
};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use super::api::{self, AppState};
use super::db::{DbHandle, ShopDb};
use super::middleware::{api_key_middleware, request_tracing_middleware};
use super::ws::{self, WsQuery};
use crate::config::{IntakeSection, ShopConfig};

/// Configuration for the shop server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub api_keys: Vec<String>,
    pub intake: IntakeSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            db_path: PathBuf::from(".shopfloor/shop.db"),
            dev_mode: false,
            api_keys: Vec::new(),
            intake: IntakeSection::default(),
        }
    }
}

impl From<&ShopConfig> for ServerConfig {
    fn from(config: &ShopConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.database.path.clone(),
            dev_mode: config.server.dev_mode,
            api_keys: config.auth.api_keys.clone(),
            intake: config.intake.clone(),
        }
    }
}

impl ServerConfig {
    /// Dev mode listens on every interface so phones on the shop wifi can
    /// reach it.
    pub fn bind_host(&self) -> &str {
        if self.dev_mode { "0.0.0.0" } else { &self.host }
    }
}

/// Build the full application router with API, WebSocket and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_tx = state.ws_tx.clone();

    api::api_router()
        .route(
            "/ws",
            get(
                move |ws_upgrade: WebSocketUpgrade, Query(query): Query<WsQuery>| {
                    ws::ws_handler_with_sender(ws_upgrade, ws_tx, query.workshop_id)
                },
            ),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn(request_tracing_middleware))
        .with_state(state)
}

/// Start the shop server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = ShopDb::new(&config.db_path).context("Failed to initialize shop database")?;
    let (ws_tx, _rx) = broadcast::channel::<String>(256);

    if config.api_keys.is_empty() {
        tracing::warn!("No api keys configured; /api is open to anyone who can reach it");
    }

    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        ws_tx,
        api_keys: config.api_keys.clone(),
        intake: config.intake.clone(),
    });

    let mut app = build_router(state);

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.bind_host(), config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        db = %config.db_path.display(),
        dev_mode = config.dev_mode,
        "Shopfloor server started"
    );
    println!("Shopfloor running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}
