use super::store::DecisionStore;
use super::types::{RateKey, COUNTER_WINDOW};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Counter state for one fixed window
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    expires_at: Instant,
}

/// Local (in-memory) decision store.
///
/// Only consistent within one process. Expiry is measured on the tokio clock,
/// so paused-time tests can step through windows and bans. Expired counters
/// and bans are swept from the request path at most once per counter window.
#[derive(Clone)]
pub struct LocalStore {
    /// Fixed window counters per key
    counters: Arc<DashMap<String, Window>>,
    /// Ban markers per key, valued by their expiry
    bans: Arc<DashMap<String, Instant>>,
    /// How long a ban marker lives
    ban_duration: Duration,
    /// When expired entries were last swept
    last_sweep: Arc<Mutex<Instant>>,
}

impl LocalStore {
    /// Create a new local store
    pub fn new(ban_duration: Duration) -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            bans: Arc::new(DashMap::new()),
            ban_duration,
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Get the number of tracked counters and bans (for testing/monitoring)
    pub fn tracked_keys(&self) -> usize {
        self.counters.len() + self.bans.len()
    }

    /// Drop entries whose expiry has passed
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.counters.retain(|_, window| window.expires_at > now);
        self.bans.retain(|_, expires_at| *expires_at > now);
    }

    /// Purge expired entries if a counter window has passed since the last sweep.
    ///
    /// Must not be called while holding a map guard, `retain` locks every shard.
    fn sweep_if_due(&self) {
        // Another caller is already sweeping
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };

        let now = Instant::now();
        if now.duration_since(*last_sweep) < COUNTER_WINDOW {
            return;
        }
        *last_sweep = now;
        drop(last_sweep);

        let before = self.tracked_keys();
        self.purge_expired();
        debug!(
            "Swept local store, {} of {} entries left",
            self.tracked_keys(),
            before
        );
    }

    /// Clear all counters and bans
    pub fn clear(&self) {
        self.counters.clear();
        self.bans.clear();
    }
}

#[async_trait]
impl DecisionStore for LocalStore {
    async fn allow(&self, key: &RateKey, limit: u32) -> Result<bool> {
        self.sweep_if_due();
        let now = Instant::now();

        // The entry guard holds the shard lock, so check-and-increment is atomic per key
        let mut window = self
            .counters
            .entry(key.as_str().to_string())
            .or_insert_with(|| Window {
                count: 0,
                expires_at: now + COUNTER_WINDOW,
            });

        if window.expires_at <= now {
            *window = Window {
                count: 0,
                expires_at: now + COUNTER_WINDOW,
            };
        }

        if window.count >= limit {
            debug!("Counter for key {} at ceiling {}", key, limit);
            return Ok(false);
        }

        window.count += 1;
        Ok(true)
    }

    async fn block(&self, key: &RateKey) -> Result<()> {
        self.bans
            .insert(key.ban_key(), Instant::now() + self.ban_duration);
        Ok(())
    }

    async fn is_blocked(&self, key: &RateKey) -> Result<bool> {
        self.sweep_if_due();
        let ban_key = key.ban_key();
        let now = Instant::now();

        self.bans.remove_if(&ban_key, |_, expires_at| *expires_at <= now);
        Ok(self.bans.contains_key(&ban_key))
    }
}
