//! Staff endpoints
//!
//! - `POST   /api/staff`          create (201)
//! - `GET    /api/staff`          list, ordered by staff id
//! - `GET    /api/staff/search`   filtered list
//! - `GET    /api/staff/{id}`     fetch one
//! - `PUT    /api/staff/{id}`     replace name, birthday and gender
//! - `DELETE /api/staff/{id}`     delete

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use staffctl_core::logic::{CreateStaffRequest, StaffResponse, StaffSearchQuery, UpdateStaffRequest};
use staffctl_core::StaffLogic;

use crate::http::error::ApiError;
use crate::http::extractors::{ApiJson, ApiQuery, Caller};
use crate::http::server::AppState;

/// Body returned by delete
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn logic(state: &AppState, caller: Caller) -> Result<StaffLogic, ApiError> {
    Ok(StaffLogic::new(state.db.clone(), caller.0)?)
}

/// POST /api/staff
async fn create_staff(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateStaffRequest>,
) -> Result<(StatusCode, Json<StaffResponse>), ApiError> {
    let staff = logic(&state, caller)?.create(req).await?;
    Ok((StatusCode::CREATED, Json(staff)))
}

/// GET /api/staff
async fn list_staff(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<StaffResponse>>, ApiError> {
    let staff = logic(&state, caller)?.list().await?;
    Ok(Json(staff))
}

/// GET /api/staff/search
async fn search_staff(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<StaffSearchQuery>,
) -> Result<Json<Vec<StaffResponse>>, ApiError> {
    let staff = logic(&state, caller)?.search(&query).await?;
    Ok(Json(staff))
}

/// GET /api/staff/{id}
async fn get_staff(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<StaffResponse>, ApiError> {
    logic(&state, caller)?
        .get(&id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            resource: "Staff",
            id,
        })
}

/// PUT /api/staff/{id}
async fn update_staff(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateStaffRequest>,
) -> Result<Json<StaffResponse>, ApiError> {
    let staff = logic(&state, caller)?.update(&id, req).await?;
    Ok(Json(staff))
}

/// DELETE /api/staff/{id}
async fn delete_staff(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    logic(&state, caller)?.delete(&id).await?;
    Ok(Json(MessageResponse {
        message: "Staff deleted successfully.",
    }))
}

/// Staff routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/staff", get(list_staff).post(create_staff))
        .route("/api/staff/search", get(search_staff))
        .route(
            "/api/staff/{id}",
            get(get_staff).put(update_staff).delete(delete_staff),
        )
}
