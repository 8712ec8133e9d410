//! Subcommand implementations

pub mod migrate;
pub mod query;
pub mod serve;

pub use migrate::{run_migrate, run_schema};
pub use query::run_query;
pub use serve::run_serve;

use std::sync::Arc;

use anyhow::{Context, Result};
use staffctl_core::db::Database;
use staffctl_core::models::schema_model;
use staffctl_core::AppConfig;

/// Connect to the configured databases, retrying transient failures.
pub(crate) async fn connect(config: &AppConfig) -> Result<Database> {
    let schema = schema_model().context("Invalid entity mapping")?;
    Database::connect(&config.database, Arc::new(schema))
        .await
        .context("Failed to connect to database")
}
