//! The `cyfr-server` binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cyfr_server::{AppState, ServerConfig, Services, build_app};

/// Sandboxed WASM component runtime with an MCP governance plane.
#[derive(Debug, Parser)]
#[command(name = "cyfr-server", version, about)]
struct Cli {
    /// Bind host (overrides CYFR_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides CYFR_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Base data directory (overrides CYFR_BASE_PATH).
    #[arg(long)]
    base_path: Option<std::path::PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Auto-indexer interval in seconds (0 disables it).
    #[arg(long, default_value_t = 300)]
    index_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut config = ServerConfig::from_env().context("configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(base_path) = cli.base_path {
        config.db_path = base_path.join("cyfr.db");
        config.base_path = base_path;
    }

    let bind = format!("{}:{}", config.host, config.port);
    let services = Services::open(config).context("opening stores")?;

    // Background planes: cache sweeper and the filesystem auto-indexer.
    let _sweeper = cyfr_storage::spawn_sweeper(Arc::clone(&services.cache));
    if cli.index_interval > 0 {
        let _indexer = cyfr_registry::spawn_auto_indexer(
            Arc::clone(&services.registry),
            Duration::from_secs(cli.index_interval),
        );
    }

    let app = build_app(AppState::new(services));
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "cyfr-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("server")?;
    Ok(())
}
