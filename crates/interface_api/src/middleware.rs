//! API middleware

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

use crate::context::{REQUEST_ID_HEADER, VENDOR_HEADER};

/// Request logging middleware
///
/// Logs every API request with its tenant, request id, status and latency.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let (vendor, request_id) = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("-")
                .to_string()
        };
        (header(VENDOR_HEADER), header(REQUEST_ID_HEADER))
    };

    let start = Instant::now();
    let response = next.run(request).await;

    info!(
        method = %method,
        uri = %uri,
        vendor = %vendor,
        request_id = %request_id,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "API request"
    );

    response
}
