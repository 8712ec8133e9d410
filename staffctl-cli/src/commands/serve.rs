//! HTTP server command
//!
//! Runs the staff API with the configured database.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;

use staffctl_core::db::migrations;
use staffctl_core::AppConfig;
use staffctl_server::{run_server, AppState, ServerConfig};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Host to bind to (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides config)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Database URL (overrides config/environment)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Create missing tables before serving
    #[arg(long)]
    pub migrate: bool,
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs, mut config: AppConfig) -> Result<()> {
    if let Some(url) = args.database_url {
        config.database.primary_url = url;
    }

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let bind_addr: SocketAddr = config
        .server
        .bind_addr()
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind_addr()))?;

    let db = super::connect(&config).await?;

    if args.migrate || config.auto_migrate {
        migrations::run(&db).await.context("Failed to run migrations")?;
    }

    tracing::info!("Starting staffctl server on {}", bind_addr);

    // Configure server
    let server_config = ServerConfig {
        bind_addr,
        cors_permissive: args.cors_permissive || config.server.cors_permissive,
    };

    // Run server (blocks until shutdown)
    run_server(AppState::new(db), server_config)
        .await
        .context("Server error")?;

    Ok(())
}
