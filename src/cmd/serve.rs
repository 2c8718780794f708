//! HTTP + WebSocket server command (`shopfloor serve`).

use anyhow::Result;
use std::path::PathBuf;

use shopfloor::config::ShopConfig;
use shopfloor::shop::server::{ServerConfig, start_server};

/// Flags that win over `shopfloor.toml` and the environment.
pub struct ServeOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
}

fn server_config(config: &ShopConfig, overrides: ServeOverrides) -> ServerConfig {
    let mut server = ServerConfig::from(config);
    if let Some(port) = overrides.port {
        server.port = port;
    }
    if let Some(host) = overrides.host {
        server.host = host;
    }
    if let Some(db_path) = overrides.db_path {
        server.db_path = db_path;
    }
    server.dev_mode |= overrides.dev;
    server
}

pub async fn cmd_serve(config: &ShopConfig, overrides: ServeOverrides, open: bool) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!(%warning, "Configuration warning");
    }
    let server = server_config(config, overrides);

    // Spawn browser open before starting the server (which blocks)
    if open {
        let url = format!("http://localhost:{}/health", server.port);
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                tracing::warn!(error = %e, "Failed to open browser");
            }
        });
    }

    start_server(server).await
}
