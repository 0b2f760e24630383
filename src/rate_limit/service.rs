use super::classifier::key_and_limit;
use super::store::DecisionStore;
use super::types::{ClassLimits, Decision, Identity, RateKey, RejectReason};
use crate::error::{LimiterError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rate decision engine: ban check first, then fixed window counting.
///
/// Holds no per-key state. Every instance pointed at the same store makes
/// consistent decisions.
#[derive(Clone)]
pub struct RateLimiterService {
    /// Shared decision store
    store: Arc<dyn DecisionStore>,
    /// Ceilings per identity class
    limits: ClassLimits,
    /// Upper bound on each store call
    store_timeout: Option<Duration>,
}

impl RateLimiterService {
    /// Create a new engine over an injected store
    pub fn new(store: Arc<dyn DecisionStore>, limits: ClassLimits) -> Self {
        info!(
            address_limit = limits.address,
            token_limit = limits.token,
            "Initializing rate decision engine"
        );
        Self {
            store,
            limits,
            store_timeout: None,
        }
    }

    /// Bound every store call by `timeout`
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    pub fn limits(&self) -> ClassLimits {
        self.limits
    }

    /// Decide whether a request from `identity` may proceed.
    ///
    /// Store errors are returned as `Err`; the caller owns the fail-open or
    /// fail-closed choice.
    pub async fn check(&self, identity: &Identity) -> Result<Decision> {
        let (key, limit) = key_and_limit(identity, &self.limits);
        self.check_key(&key, limit).await
    }

    /// Decide for an already-derived key and ceiling
    pub async fn check_key(&self, key: &RateKey, limit: u32) -> Result<Decision> {
        if self.bounded(self.store.is_blocked(key)).await? {
            debug!("Key {} is banned", key);
            return Ok(Decision::Rejected(RejectReason::Banned));
        }

        if self.bounded(self.store.allow(key, limit)).await? {
            debug!("Rate limit check passed for key {}", key);
            return Ok(Decision::Allowed);
        }

        warn!("Rate limit exceeded for key {} (limit {}), banning", key, limit);

        // The request is rejected whether or not the ban lands
        if let Err(e) = self.bounded(self.store.block(key)).await {
            warn!("Failed to ban key {}: {}", key, e);
        }

        Ok(Decision::Rejected(RejectReason::LimitExceeded))
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.store_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| LimiterError::StoreTimeout(timeout))?,
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::local::LocalStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LIMITS: ClassLimits = ClassLimits {
        address: 5,
        token: 10,
    };

    fn local_service(ban: Duration) -> RateLimiterService {
        RateLimiterService::new(Arc::new(LocalStore::new(ban)), LIMITS)
    }

    /// Store whose calls can be made to fail or hang
    #[derive(Default)]
    struct FaultyStore {
        fail_is_blocked: bool,
        fail_block: bool,
        hang: bool,
        allow_calls: AtomicUsize,
        block_calls: AtomicUsize,
    }

    fn store_error() -> LimiterError {
        LimiterError::Store(redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    #[async_trait]
    impl DecisionStore for FaultyStore {
        async fn allow(&self, _key: &RateKey, _limit: u32) -> Result<bool> {
            self.allow_calls.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }

        async fn block(&self, _key: &RateKey) -> Result<()> {
            self.block_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_block {
                return Err(store_error());
            }
            Ok(())
        }

        async fn is_blocked(&self, _key: &RateKey) -> Result<bool> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail_is_blocked {
                return Err(store_error());
            }
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_limit_then_ban() {
        let service = local_service(Duration::from_secs(60));
        let identity = Identity::address("192.168.1.1");

        for _ in 0..5 {
            assert_eq!(service.check(&identity).await.unwrap(), Decision::Allowed);
        }

        assert_eq!(
            service.check(&identity).await.unwrap(),
            Decision::Rejected(RejectReason::LimitExceeded)
        );
        assert_eq!(
            service.check(&identity).await.unwrap(),
            Decision::Rejected(RejectReason::Banned)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ban_outlives_counter_window() {
        let service = local_service(Duration::from_secs(3));
        let identity = Identity::address("192.168.1.2");
        let limits = ClassLimits {
            address: 1,
            token: 10,
        };
        let (key, limit) = key_and_limit(&identity, &limits);

        assert!(service.check_key(&key, limit).await.unwrap().is_allowed());
        assert!(!service.check_key(&key, limit).await.unwrap().is_allowed());

        // Counter window is long gone, the ban still holds
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(
            service.check_key(&key, limit).await.unwrap(),
            Decision::Rejected(RejectReason::Banned)
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(service.check_key(&key, limit).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_classes_are_isolated() {
        let service = local_service(Duration::from_secs(60));
        let address = Identity::address("192.168.1.1");
        let token = Identity::token("192.168.1.1");

        for _ in 0..5 {
            service.check(&address).await.unwrap();
        }
        assert!(!service.check(&address).await.unwrap().is_allowed());

        for _ in 0..10 {
            assert!(service.check(&token).await.unwrap().is_allowed());
        }
        assert!(!service.check(&token).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_store_error_surfaces() {
        let store = Arc::new(FaultyStore {
            fail_is_blocked: true,
            ..Default::default()
        });
        let service = RateLimiterService::new(store.clone(), LIMITS);

        let err = service
            .check(&Identity::address("10.0.0.1"))
            .await
            .unwrap_err();
        assert!(err.is_store_failure());

        // Counting is never attempted without a ban answer
        assert_eq!(store.allow_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejects_even_when_ban_fails() {
        let store = Arc::new(FaultyStore {
            fail_block: true,
            ..Default::default()
        });
        let service = RateLimiterService::new(store.clone(), LIMITS);

        let decision = service.check(&Identity::token("abc")).await.unwrap();
        assert_eq!(decision, Decision::Rejected(RejectReason::LimitExceeded));
        assert_eq!(store.block_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout() {
        let store = Arc::new(FaultyStore {
            hang: true,
            ..Default::default()
        });
        let service = RateLimiterService::new(store, LIMITS)
            .with_store_timeout(Duration::from_millis(200));

        let err = service
            .check(&Identity::address("10.0.0.2"))
            .await
            .unwrap_err();
        assert!(matches!(err, LimiterError::StoreTimeout(_)));
    }
}
