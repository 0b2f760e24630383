use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{info, info_span, Span};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Initialize tracing/logging
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "edge_limiter=debug,tower_http=debug".into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    info!("Tracing initialized");
}

/// Middleware to add request ID to requests
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    // Reuse an inbound request ID when it is a valid header value
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Request ID extension type
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Extract request ID from request extensions
pub fn get_request_id<B>(req: &Request<B>) -> Option<&str> {
    req.extensions().get::<RequestId>().map(|id| id.0.as_str())
}

/// Span for one HTTP request, tagged with its request ID.
///
/// Used as the `TraceLayer` span maker, so `request_id_middleware` must sit
/// outside the trace layer for the ID to be present.
pub fn request_span(req: &Request<Body>) -> Span {
    info_span!(
        "request",
        method = %req.method(),
        uri = %req.uri(),
        request_id = get_request_id(req).unwrap_or("-"),
    )
}
