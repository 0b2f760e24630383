use super::types::RateKey;
use crate::error::Result;
use async_trait::async_trait;

/// Shared key-value store that holds fixed-window counters and ban markers.
///
/// Implementations must make `allow` atomic per key: concurrent callers on the
/// same fresh key never see more than `limit` successes, and the window TTL is
/// armed exactly once per window.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Count a request against `key` unless the window already holds `limit`
    /// requests. Returns `false` without mutating anything when the ceiling is
    /// reached.
    async fn allow(&self, key: &RateKey, limit: u32) -> Result<bool>;

    /// Place (or refresh) the ban marker for `key`
    async fn block(&self, key: &RateKey) -> Result<()>;

    /// Whether a live ban marker exists for `key`
    async fn is_blocked(&self, key: &RateKey) -> Result<bool>;
}
