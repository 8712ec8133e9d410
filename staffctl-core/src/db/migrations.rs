//! Schema migrations derived from the entity mappings

use super::database::Database;
use super::schema::SchemaModel;
use super::DbError;

/// Enable the configured extensions and create a table for every mapped
/// entity. Safe to run repeatedly.
///
/// Extensions are optional: a server that does not ship one only logs a
/// warning.
pub async fn run(db: &Database) -> Result<(), DbError> {
    tracing::info!("Running schema migrations...");
    let pool = db.primary();

    for ext in db.schema().extensions() {
        let stmt = format!("CREATE EXTENSION IF NOT EXISTS \"{}\"", ext);
        match sqlx::query(&stmt).execute(pool).await {
            Ok(_) => tracing::debug!(extension = ext, "extension enabled"),
            Err(e) => tracing::warn!(extension = ext, error = %e, "could not enable extension"),
        }
    }

    for descriptor in db.schema().descriptors() {
        sqlx::query(&descriptor.create_table_sql())
            .execute(pool)
            .await?;
        tracing::debug!(table = descriptor.table(), "table ready");
    }

    tracing::info!("Schema migrations complete");
    Ok(())
}

/// Full DDL script for `model`, one statement per line group.
pub fn render(model: &SchemaModel) -> String {
    let mut out = String::new();
    for ext in model.extensions() {
        out.push_str(&format!("CREATE EXTENSION IF NOT EXISTS \"{}\";\n", ext));
    }
    for descriptor in model.descriptors() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&descriptor.create_table_sql());
        out.push_str(";\n");
    }
    out
}
