//! Rate limiting module
//!
//! Fixed one-second window counters plus a temporary ban once a ceiling is
//! crossed. Clients are identified by access token when they present one and
//! by network address otherwise.
//!
//! # Pieces
//!
//! - [`classifier`]: request metadata to `(key, limit)`
//! - [`store::DecisionStore`]: the three store primitives (`allow`, `block`, `is_blocked`)
//! - [`redis::RedisStore`]: shared store for multi-process deployments
//! - [`local::LocalStore`]: in-process store for tests and single instances
//! - [`service::RateLimiterService`]: ban-then-count decision engine
//! - [`middleware`]: axum boundary, 429 responses, fail-open / fail-closed
//!
//! Windows are fixed, so a client can land up to twice its limit across a
//! window boundary. That burst is a known property of the algorithm.
//!
//! # Example
//!
//! ```rust,no_run
//! use edge_limiter::rate_limit::{ClassLimits, Identity, LocalStore, RateLimiterService};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let limits = ClassLimits { address: 5, token: 10 };
//!
//!     // In-memory store
//!     let store = Arc::new(LocalStore::new(Duration::from_secs(60)));
//!
//!     // Or a shared Redis store
//!     // let store = Arc::new(RedisStore::connect(
//!     //     "redis://localhost:6379",
//!     //     "ratelimit:",
//!     //     Duration::from_secs(60),
//!     // ).await.unwrap());
//!
//!     let service = RateLimiterService::new(store, limits);
//!     let decision = service.check(&Identity::address("192.168.1.1")).await.unwrap();
//!     assert!(decision.is_allowed());
//! }
//! ```

pub mod classifier;
pub mod local;
pub mod lua_scripts;
pub mod middleware;
pub mod redis;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use classifier::{classify, key_and_limit};
pub use local::LocalStore;
pub use middleware::{rate_limit_middleware, RateLimitMiddleware, RATE_LIMIT_MESSAGE};
pub use redis::RedisStore;
pub use service::RateLimiterService;
pub use store::DecisionStore;
pub use types::{ClassLimits, Decision, Identity, IdentityClass, RateKey, RejectReason};
