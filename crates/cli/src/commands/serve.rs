//! `emberchat serve` starts the HTTP API server.

use std::path::PathBuf;

use anyhow::Context;
use emberchat_config::AppConfig;
use tracing::info;

pub async fn run(
    mut config: AppConfig,
    port_override: Option<u16>,
    host_override: Option<String>,
) -> anyhow::Result<()> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if let Some(host) = host_override {
        config.gateway.host = host;
    }

    if let Some(path) = sqlite_file_path(&config.database.url) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    println!("🔥 Emberchat");
    println!(
        "   Listening: {}:{}{}",
        config.gateway.host, config.gateway.port, config.gateway.api_prefix
    );
    println!(
        "   Model:     {}",
        if config.has_api_key() {
            config.model.as_str()
        } else {
            "demo mode (no ANTHROPIC_API_KEY)"
        }
    );
    info!(database = %config.database.url, "Starting server");

    emberchat_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}

/// The on-disk path of a SQLite URL, or `None` for in-memory databases.
pub(crate) fn sqlite_file_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}
