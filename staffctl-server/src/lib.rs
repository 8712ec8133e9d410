//! staffctl-server: HTTP API for staff records
//!
//! Thin axum layer over `staffctl_core::StaffLogic`. Each request builds a
//! `CallerContext` from its headers, so audit stamps name the caller.

pub mod http;

pub use http::{build_router, run_server, ApiError, AppState, ServerConfig, ServerError};
