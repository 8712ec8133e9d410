//! Schema commands

use anyhow::{Context, Result};
use clap::Parser;

use staffctl_core::db::migrations;
use staffctl_core::models::schema_model;
use staffctl_core::AppConfig;

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Database URL (overrides config/environment)
    #[arg(long)]
    pub database_url: Option<String>,
}

/// Create extensions and missing tables.
pub async fn run_migrate(args: MigrateArgs, mut config: AppConfig) -> Result<()> {
    if let Some(url) = args.database_url {
        config.database.primary_url = url;
    }
    let db = super::connect(&config).await?;
    migrations::run(&db).await.context("Failed to run migrations")?;
    println!("Schema is up to date");
    Ok(())
}

/// Print the DDL for every mapped entity.
pub fn run_schema() -> Result<()> {
    let model = schema_model().context("Invalid entity mapping")?;
    print!("{}", migrations::render(&model));
    Ok(())
}
