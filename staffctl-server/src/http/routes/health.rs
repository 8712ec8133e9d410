//! Health check endpoint
//!
//! Reports the build version and whether the primary database answers.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use staffctl_core::Database;

use crate::http::server::AppState;

/// Upper bound for the database check.
const DATABASE_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database is unreachable
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

async fn database_reachable(db: &Database) -> bool {
    match tokio::time::timeout(DATABASE_CHECK_TIMEOUT, db.execute_scalar("SELECT 1", 1)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::warn!("health check query failed: {}", e);
            false
        }
        Err(_) => {
            tracing::warn!("health check timed out after {:?}", DATABASE_CHECK_TIMEOUT);
            false
        }
    }
}

/// GET /health
///
/// 200 when the database answers, 503 otherwise.
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status, response) = if database_reachable(&state.db).await {
        (StatusCode::OK, ("ok", "reachable"))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, ("degraded", "unreachable"))
    };

    (
        status,
        Json(HealthResponse {
            status: response.0,
            version: env!("CARGO_PKG_VERSION"),
            database: response.1,
        }),
    )
}

/// Health routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
