use super::classifier::classify;
use super::service::RateLimiterService;
use super::types::{Decision, Identity};
use crate::config::FailurePolicy;
use crate::metrics::{record_decision, record_store_error};
use crate::observability::get_request_id;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{debug, error, warn};

/// Body sent with every 429
pub const RATE_LIMIT_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Rate limiting middleware state
#[derive(Clone)]
pub struct RateLimitMiddleware {
    /// The decision engine
    service: RateLimiterService,
    /// Header that carries the access token
    token_header: HeaderName,
    /// What to do when the store cannot answer
    failure_policy: FailurePolicy,
}

impl RateLimitMiddleware {
    /// Create a new rate limiting middleware
    pub fn new(
        service: RateLimiterService,
        token_header: HeaderName,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            service,
            token_header,
            failure_policy,
        }
    }

    /// Derive the identity of a request from its peer address and token header
    pub fn identify(&self, request: &Request) -> Identity {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let token = request
            .headers()
            .get(&self.token_header)
            .and_then(|v| v.to_str().ok());

        classify(&remote_addr, token)
    }

    /// Apply rate limiting to a request
    pub async fn apply(&self, request: Request) -> std::result::Result<Request, Response> {
        let identity = self.identify(&request);
        let request_id = get_request_id(&request).unwrap_or("-").to_string();

        match self.service.check(&identity).await {
            Ok(decision) => {
                record_decision(identity.class.as_str(), decision.outcome());

                match decision {
                    Decision::Allowed => {
                        debug!("Request from {:?} {} allowed", identity.class, identity.value);
                        Ok(request)
                    }
                    Decision::Rejected(reason) => {
                        warn!(
                            request_id = %request_id,
                            "Rejected request from {:?} {} ({})",
                            identity.class,
                            identity.value,
                            reason.as_str()
                        );
                        Err(create_rate_limit_response())
                    }
                }
            }
            Err(e) => {
                record_store_error(self.failure_policy.as_str());

                match self.failure_policy {
                    FailurePolicy::Open => {
                        warn!(
                            request_id = %request_id,
                            "Decision store unavailable, failing open for {:?} {}: {}",
                            identity.class, identity.value, e
                        );
                        Ok(request)
                    }
                    FailurePolicy::Closed => {
                        error!(
                            request_id = %request_id,
                            "Decision store unavailable, failing closed for {:?} {}: {}",
                            identity.class, identity.value, e
                        );
                        Err(e.into_response())
                    }
                }
            }
        }
    }
}

/// Create a 429 Too Many Requests response with the fixed message
fn create_rate_limit_response() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        RATE_LIMIT_MESSAGE,
    )
        .into_response()
}

/// Axum middleware function for rate limiting
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimitMiddleware>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.apply(request).await {
        Ok(req) => next.run(req).await,
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::local::LocalStore;
    use crate::rate_limit::types::{ClassLimits, IdentityClass};
    use axum::body::Body;
    use std::sync::Arc;
    use std::time::Duration;

    fn middleware() -> RateLimitMiddleware {
        let service = RateLimiterService::new(
            Arc::new(LocalStore::new(Duration::from_secs(60))),
            ClassLimits {
                address: 5,
                token: 10,
            },
        );
        RateLimitMiddleware::new(
            service,
            HeaderName::from_static("api_key"),
            FailurePolicy::Open,
        )
    }

    #[test]
    fn test_identify_by_address() {
        let mut request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("192.168.1.1:1234".parse().unwrap()));

        let identity = middleware().identify(&request);
        assert_eq!(identity.class, IdentityClass::Address);
        assert_eq!(identity.value, "192.168.1.1");
    }

    #[test]
    fn test_identify_by_token() {
        let mut request = axum::http::Request::builder()
            .uri("/")
            .header("API_KEY", "token123")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("192.168.1.1:1234".parse().unwrap()));

        let identity = middleware().identify(&request);
        assert_eq!(identity, Identity::token("token123"));
    }

    #[test]
    fn test_identify_without_peer_address() {
        let request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let identity = middleware().identify(&request);
        assert_eq!(identity, Identity::address("unknown"));
    }

    #[tokio::test]
    async fn test_rate_limit_response() {
        let response = create_rate_limit_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], RATE_LIMIT_MESSAGE.as_bytes());
    }
}
