//! Custom Axum extractors

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use staffctl_core::CallerContext;

use super::error::ApiError;
use super::server::AppState;

/// Header carrying the caller's display name (used for audit stamps)
pub const CALLER_NAME_HEADER: &str = "x-caller-name";

/// Header carrying the caller's tenant
pub const TENANT_HEADER: &str = "x-tenant-id";

/// JSON body whose parse failures become `ApiError` responses.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string whose parse failures become `ApiError` responses.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Caller identity for the current request.
///
/// A missing or unreadable name header yields an anonymous caller.
pub struct Caller(pub CallerContext);

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(caller_from_headers(
            &parts.headers,
            CallerContext::new(Arc::clone(&state.services)),
        )))
    }
}

fn caller_from_headers(headers: &HeaderMap, base: CallerContext) -> CallerContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };

    let mut caller = base;
    if let Some(name) = header(CALLER_NAME_HEADER) {
        caller = caller.with_display_name(name);
    }
    if let Some(tenant) = header(TENANT_HEADER) {
        caller = caller.with_tenant(tenant);
    }
    caller
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_NAME_HEADER, HeaderValue::from_static("Jane Doe"));
        headers.insert(TENANT_HEADER, HeaderValue::from_static("acme"));

        let caller = caller_from_headers(&headers, CallerContext::anonymous());
        assert_eq!(caller.audit_name(), "Jane Doe");
        assert_eq!(caller.tenant(), Some("acme"));
    }

    #[test]
    fn missing_headers_mean_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_NAME_HEADER, HeaderValue::from_static("   "));

        let caller = caller_from_headers(&headers, CallerContext::anonymous());
        assert_eq!(caller.audit_name(), "-");
        assert_eq!(caller.tenant(), None);
    }
}
