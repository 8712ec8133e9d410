//! Raw scalar query command

use anyhow::{Context, Result};
use clap::Parser;

use staffctl_core::AppConfig;

#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// SQL returning a single value (first column of the first row)
    pub sql: String,

    /// Statement timeout in seconds (0 = none)
    #[arg(long, short = 't', default_value_t = 30)]
    pub timeout: u64,
}

/// Run a scalar query and print the value, or `NULL` when there is none.
pub async fn run_query(args: QueryArgs, config: AppConfig) -> Result<()> {
    let db = super::connect(&config).await?;
    let value = db
        .execute_scalar(&args.sql, args.timeout)
        .await
        .context("Query failed")?;

    match value {
        Some(value) => println!("{}", value.to_text()),
        None => println!("NULL"),
    }
    Ok(())
}
