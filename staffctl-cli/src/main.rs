//! staffctl CLI - staff record service
//!
//! - `serve`: run the HTTP API
//! - `migrate`: create extensions and missing tables
//! - `schema`: print the DDL for the mapped entities
//! - `query`: run a raw scalar SQL query

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use staffctl_core::AppConfig;

mod commands;
mod tracing_setup;

use tracing_setup::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "staffctl",
    author,
    version,
    about = "Staff record service over PostgreSQL"
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (default: ~/.staffctl/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Create extensions and missing tables
    Migrate(commands::migrate::MigrateArgs),
    /// Print the schema DDL without connecting
    Schema,
    /// Run a raw SQL query returning one value
    Query(commands::query::QueryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&TracingConfig { debug: cli.debug }) {
        eprintln!("warning: failed to initialize logging: {}", e);
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => commands::run_serve(args, AppConfig::load(config_path)?).await?,
        Commands::Migrate(args) => {
            commands::run_migrate(args, AppConfig::load(config_path)?).await?
        }
        Commands::Schema => commands::run_schema()?,
        Commands::Query(args) => commands::run_query(args, AppConfig::load(config_path)?).await?,
    }

    Ok(())
}
