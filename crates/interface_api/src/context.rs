//! Tenant context extraction
//!
//! Authentication happens at the gateway, which forwards the resolved tenant
//! and user as headers. Handlers receive them as an explicit
//! [`RequestContext`]; the request id set by the request-id layer becomes the
//! correlation id.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use uuid::Uuid;

use core_kernel::{UserId, VendorId};
use domain_settlement::RequestContext;

use crate::error::ApiError;

pub const VENDOR_HEADER: &str = "x-vendor-id";
pub const USER_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Extractor yielding the caller's [`RequestContext`]
#[derive(Debug, Clone, Copy)]
pub struct Tenant(pub RequestContext);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

impl Tenant {
    /// Builds the context from gateway headers
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the vendor header is missing or either id
    /// does not parse.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let vendor_id: VendorId = header(headers, VENDOR_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {VENDOR_HEADER} header")))?
            .parse()
            .map_err(|e| ApiError::Unauthorized(format!("{VENDOR_HEADER}: {e}")))?;

        let user_id = header(headers, USER_HEADER)
            .map(|v| {
                v.parse::<UserId>()
                    .map_err(|e| ApiError::Unauthorized(format!("{USER_HEADER}: {e}")))
            })
            .transpose()?;

        let mut ctx = RequestContext::new(vendor_id, user_id);
        if let Some(request_id) = header(headers, REQUEST_ID_HEADER).and_then(|v| Uuid::parse_str(v).ok()) {
            ctx.correlation_id = request_id;
        }
        Ok(Tenant(ctx))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Tenant::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_context_from_headers() {
        let vendor = Uuid::new_v4();
        let user = Uuid::new_v4();
        let request_id = Uuid::new_v4();

        let mut headers = HeaderMap::new();
        headers.insert(VENDOR_HEADER, HeaderValue::from_str(&vendor.to_string()).unwrap());
        headers.insert(USER_HEADER, HeaderValue::from_str(&format!("USR-{user}")).unwrap());
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(&request_id.to_string()).unwrap());

        let Tenant(ctx) = Tenant::from_headers(&headers).unwrap();
        assert_eq!(ctx.vendor_id, VendorId::from_uuid(vendor));
        assert_eq!(ctx.user_id, Some(UserId::from_uuid(user)));
        assert_eq!(ctx.correlation_id, request_id);
    }

    #[test]
    fn test_missing_vendor_is_unauthorized() {
        let result = Tenant::from_headers(&HeaderMap::new());
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_malformed_user_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(VENDOR_HEADER, HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap());
        headers.insert(USER_HEADER, HeaderValue::from_static("admin"));
        assert!(matches!(Tenant::from_headers(&headers), Err(ApiError::Unauthorized(_))));
    }
}
